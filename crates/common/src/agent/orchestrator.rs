//! Turn driver: sequences the stages by the routes they report
//!
//! The machine is forward-only. Every stage runs at most once per turn, so the
//! external calls of a turn are bounded by one classification, one retrieval,
//! one judgement, one web search and one generation.

use super::answer::{AnswerAssembly, AnswerSource};
use super::collaborators::{Classifier, Generator, Judge, SimilarityStore, WebSearchProvider};
use super::judge::SufficiencyJudge;
use super::retrieval::KnowledgeRetrieval;
use super::router::IntentRouter;
use super::state::{Message, Query, Role, Route, TurnState};
use super::trace::{Trace, TraceEvent};
use super::web::WebFallback;
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::metrics::{self, StageTimer};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Routing,
    Retrieval,
    WebFallback,
    AnswerAssembly,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Routing => "routing",
            Stage::Retrieval => "retrieval",
            Stage::WebFallback => "web_fallback",
            Stage::AnswerAssembly => "answer_assembly",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition table
pub fn transition(from: Stage, route: Route) -> Stage {
    match (from, route) {
        (Stage::Routing, Route::Rag) => Stage::Retrieval,
        (Stage::Routing, Route::Web) => Stage::WebFallback,
        (Stage::Routing, Route::Answer) => Stage::AnswerAssembly,
        (Stage::Routing, Route::End) => Stage::Done,
        (Stage::Retrieval, Route::Web) => Stage::WebFallback,
        (Stage::Retrieval, _) => Stage::AnswerAssembly,
        (Stage::WebFallback, _) => Stage::AnswerAssembly,
        (Stage::AnswerAssembly, _) | (Stage::Done, _) => Stage::Done,
    }
}

/// External services a turn may call
#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn Classifier>,
    pub judge: Arc<dyn Judge>,
    pub generator: Arc<dyn Generator>,
    pub store: Arc<dyn SimilarityStore>,
    pub search: Arc<dyn WebSearchProvider>,
}

/// Tunables for the retrieval and web stages
#[derive(Debug, Clone, Copy)]
pub struct TurnSettings {
    pub top_k: usize,
    pub max_web_results: usize,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self { top_k: 20, max_web_results: 3 }
    }
}

impl From<&AppConfig> for TurnSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            max_web_results: config.web_search.max_results,
        }
    }
}

/// Result of one completed turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub answer: String,
    /// Route chosen by the router after policy overrides
    pub route: Route,
    /// Prior history plus this turn's user and assistant messages
    pub conversation: Vec<Message>,
    pub trace: Vec<TraceEvent>,
}

pub struct Orchestrator {
    router: IntentRouter,
    retrieval: KnowledgeRetrieval,
    web: WebFallback,
    answer: AnswerAssembly,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, settings: TurnSettings) -> Self {
        let Collaborators { classifier, judge, generator, store, search } = collaborators;

        Self {
            router: IntentRouter::new(classifier),
            retrieval: KnowledgeRetrieval::new(store, SufficiencyJudge::new(judge), settings.top_k),
            web: WebFallback::new(search, settings.max_web_results),
            answer: AnswerAssembly::new(generator),
        }
    }

    /// Process one query on top of `history`.
    ///
    /// A failed classifier, judge transport or generator aborts the turn;
    /// no partial answer is produced.
    #[instrument(skip(self, query, history), fields(session_id = %query.session_id))]
    pub async fn run(&self, query: &Query, history: Vec<Message>) -> Result<TurnOutcome> {
        let mut state = TurnState::new(history);
        state.push(Message::user(query.question.as_str()));

        let mut trace = Trace::new();
        let mut visited: Vec<Stage> = Vec::with_capacity(4);
        let mut routed: Option<Route> = None;
        let mut stage = Stage::Routing;

        while stage != Stage::Done {
            if visited.contains(&stage) {
                return Err(AppError::Internal {
                    message: format!("stage '{}' re-entered within one turn", stage),
                });
            }
            visited.push(stage);

            debug!(%stage, "Entering stage");
            let timer = StageTimer::start(stage.as_str());
            let next_route = self.step(stage, query, &mut state, &mut trace).await?;
            timer.finish();

            if routed.is_none() {
                routed = Some(next_route);
            }
            state.route = Some(next_route);
            stage = transition(stage, next_route);
        }

        let route = routed.unwrap_or(Route::Answer);
        let answer = match state.conversation().last() {
            Some(message) if message.role == Role::Assistant => message.content.clone(),
            _ => {
                return Err(AppError::Internal {
                    message: "turn finished without an assistant message".to_string(),
                })
            }
        };

        metrics::record_turn(route.as_str());
        info!(route = %route, stages = visited.len(), "Turn completed");

        Ok(TurnOutcome {
            answer,
            route,
            conversation: state.into_conversation(),
            trace: trace.into_events(),
        })
    }

    /// Execute a single stage and return the route it reports
    async fn step(
        &self,
        stage: Stage,
        query: &Query,
        state: &mut TurnState,
        trace: &mut Trace,
    ) -> Result<Route> {
        match stage {
            Stage::Routing => {
                let routing = self
                    .router
                    .route(&query.question, query.web_search_enabled, query.has_documents())
                    .await?;

                let overridden = routing.was_overridden().then(|| routing.classified.as_str());
                trace.router(routing.route.as_str(), overridden);

                if let Some(reply) = routing.reply {
                    state.push(Message::assistant(reply));
                }
                Ok(routing.route)
            }
            Stage::Retrieval => {
                let retrieval = self
                    .retrieval
                    .retrieve(&query.question, query.selected_documents(), query.web_search_enabled)
                    .await?;

                trace.retrieval(&retrieval.context, retrieval.chunk_count, retrieval.sufficient);
                state.retrieved_context = retrieval.context;
                Ok(retrieval.next_route)
            }
            Stage::WebFallback => {
                let (context, next_route) =
                    self.web.search(&query.question, query.web_search_enabled).await;

                metrics::record_web_fallback(context.label());
                trace.web(context.label(), context.content());
                state.web_context = context;
                Ok(next_route)
            }
            Stage::AnswerAssembly => {
                let (text, source) = self
                    .answer
                    .assemble(
                        &query.question,
                        &state.retrieved_context,
                        &state.web_context,
                        query.has_documents(),
                        query.web_search_enabled,
                    )
                    .await?;

                let short_circuit = source == AnswerSource::ShortCircuit;
                if short_circuit {
                    metrics::record_insufficient_information();
                }
                trace.answer(short_circuit);
                state.push(Message::assistant(text));
                Ok(Route::Answer)
            }
            Stage::Done => Ok(Route::End),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::answer::INSUFFICIENT_INFORMATION;
    use crate::agent::collaborators::WebResult;
    use crate::agent::fakes::{
        ScriptedClassifier, ScriptedGenerator, ScriptedJudge, ScriptedSearch, ScriptedStore,
    };

    struct Harness {
        classifier: Arc<ScriptedClassifier>,
        judge: Arc<ScriptedJudge>,
        generator: Arc<ScriptedGenerator>,
        store: Arc<ScriptedStore>,
        search: Arc<ScriptedSearch>,
    }

    impl Harness {
        fn new(classifier: ScriptedClassifier) -> Self {
            Self {
                classifier: Arc::new(classifier),
                judge: Arc::new(ScriptedJudge::returning(true)),
                generator: Arc::new(ScriptedGenerator::returning("generated answer")),
                store: Arc::new(ScriptedStore::with_chunks(&[])),
                search: Arc::new(ScriptedSearch::returning(vec![WebResult {
                    title: "Hanoi weather".into(),
                    content: "31C and humid".into(),
                    url: "https://weather.example/hanoi".into(),
                }])),
            }
        }

        fn judge(mut self, judge: ScriptedJudge) -> Self {
            self.judge = Arc::new(judge);
            self
        }

        fn store(mut self, store: ScriptedStore) -> Self {
            self.store = Arc::new(store);
            self
        }

        fn search(mut self, search: ScriptedSearch) -> Self {
            self.search = Arc::new(search);
            self
        }

        fn generator(mut self, generator: ScriptedGenerator) -> Self {
            self.generator = Arc::new(generator);
            self
        }

        fn orchestrator(&self) -> Orchestrator {
            Orchestrator::new(
                Collaborators {
                    classifier: self.classifier.clone(),
                    judge: self.judge.clone(),
                    generator: self.generator.clone(),
                    store: self.store.clone(),
                    search: self.search.clone(),
                },
                TurnSettings::default(),
            )
        }

        fn prompt(&self) -> String {
            self.generator.last_prompt().unwrap_or_default()
        }
    }

    fn query(question: &str, web: bool, docs: &[&str]) -> Query {
        Query::new("session-1", question, web, docs.iter().map(|d| d.to_string()))
    }

    #[test]
    fn test_transition_table() {
        assert_eq!(transition(Stage::Routing, Route::Rag), Stage::Retrieval);
        assert_eq!(transition(Stage::Routing, Route::Web), Stage::WebFallback);
        assert_eq!(transition(Stage::Routing, Route::Answer), Stage::AnswerAssembly);
        assert_eq!(transition(Stage::Routing, Route::End), Stage::Done);
        assert_eq!(transition(Stage::Retrieval, Route::Web), Stage::WebFallback);
        assert_eq!(transition(Stage::Retrieval, Route::Answer), Stage::AnswerAssembly);
        assert_eq!(transition(Stage::WebFallback, Route::Answer), Stage::AnswerAssembly);
        assert_eq!(transition(Stage::AnswerAssembly, Route::Answer), Stage::Done);
    }

    #[test]
    fn test_no_path_revisits_a_stage() {
        // Walk every route combination and check each stage appears at most once
        let routes = [Route::Rag, Route::Web, Route::Answer, Route::End];
        for first in routes {
            for second in routes {
                let mut seen = vec![Stage::Routing];
                let mut stage = transition(Stage::Routing, first);
                let mut route = second;
                while stage != Stage::Done {
                    assert!(!seen.contains(&stage), "revisited {stage}");
                    seen.push(stage);
                    stage = transition(stage, route);
                    route = Route::Answer;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_time_sensitive_question_uses_web() {
        let h = Harness::new(ScriptedClassifier::returning(Route::Web, None));
        let outcome = h
            .orchestrator()
            .run(&query("What's today's weather in Hanoi?", true, &[]), vec![])
            .await
            .unwrap();

        assert_eq!(outcome.route, Route::Web);
        assert_eq!(outcome.answer, "generated answer");
        assert_eq!(h.search.calls(), 1);
        assert_eq!(h.store.searches(), 0);
        assert!(h.prompt().contains("Web Search Results:\nTitle: Hanoi weather"));

        let nodes: Vec<&str> = outcome.trace.iter().map(|e| e.node_name.as_str()).collect();
        assert_eq!(nodes, vec!["router", "web_search", "answer"]);
    }

    #[tokio::test]
    async fn test_rag_without_documents_falls_through_to_web() {
        let h = Harness::new(ScriptedClassifier::returning(Route::Rag, None));
        let outcome = h
            .orchestrator()
            .run(&query("What's today's weather in Hanoi?", true, &[]), vec![])
            .await
            .unwrap();

        assert_eq!(outcome.route, Route::Rag);
        assert_eq!(h.store.searches(), 0);
        assert_eq!(h.judge.calls(), 0);
        assert_eq!(h.search.calls(), 1);
        assert_eq!(h.generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_greeting_ends_with_reply_only() {
        let h = Harness::new(ScriptedClassifier::returning(Route::End, Some("Hi! How can I help?")));
        let outcome = h
            .orchestrator()
            .run(&query("Hi there!", true, &["manual.pdf"]), vec![])
            .await
            .unwrap();

        assert_eq!(outcome.answer, "Hi! How can I help?");
        assert_eq!(outcome.route, Route::End);
        assert_eq!(outcome.trace.len(), 1);
        assert_eq!(h.store.searches(), 0);
        assert_eq!(h.judge.calls(), 0);
        assert_eq!(h.search.calls(), 0);
        assert_eq!(h.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_sufficient_documents_skip_web() {
        let h = Harness::new(ScriptedClassifier::returning(Route::Rag, None))
            .store(ScriptedStore::with_chunks(&["Hold the power button for ten seconds to reset."]));
        let outcome = h
            .orchestrator()
            .run(&query("How do I reset the device?", true, &["manual.pdf"]), vec![])
            .await
            .unwrap();

        assert_eq!(outcome.answer, "generated answer");
        assert_eq!(h.judge.calls(), 1);
        assert_eq!(h.search.calls(), 0);
        assert!(h.prompt().contains("Knowledge Base Info:\nHold the power button"));
    }

    #[tokio::test]
    async fn test_insufficient_documents_with_web_disabled_answer_from_kb() {
        let h = Harness::new(ScriptedClassifier::returning(Route::Rag, None))
            .store(ScriptedStore::with_chunks(&["Chapter 3 covers packaging."]))
            .judge(ScriptedJudge::returning(false));
        let outcome = h
            .orchestrator()
            .run(&query("How do I reset the device?", false, &["manual.pdf"]), vec![])
            .await
            .unwrap();

        assert_eq!(outcome.answer, "generated answer");
        assert_eq!(h.judge.calls(), 1);
        assert_eq!(h.search.calls(), 0);
        let prompt = h.prompt();
        assert!(prompt.contains("Knowledge Base Info:\nChapter 3 covers packaging."));
        assert!(!prompt.contains("Web Search Results"));
    }

    #[tokio::test]
    async fn test_insufficient_documents_fall_back_to_web_once() {
        let h = Harness::new(ScriptedClassifier::returning(Route::Rag, None))
            .store(ScriptedStore::with_chunks(&["Chapter 3 covers packaging."]))
            .judge(ScriptedJudge::returning(false));
        let outcome = h
            .orchestrator()
            .run(&query("Latest firmware version?", true, &["manual.pdf"]), vec![])
            .await
            .unwrap();

        assert_eq!(h.search.calls(), 1);
        let nodes: Vec<&str> = outcome.trace.iter().map(|e| e.node_name.as_str()).collect();
        assert_eq!(nodes, vec!["router", "rag_lookup", "web_search", "answer"]);
        let prompt = h.prompt();
        let kb = prompt.find("Knowledge Base Info").unwrap();
        let web = prompt.find("Web Search Results").unwrap();
        assert!(kb < web);
    }

    #[tokio::test]
    async fn test_search_failure_never_reaches_generator() {
        let h = Harness::new(ScriptedClassifier::returning(Route::Web, None))
            .search(ScriptedSearch::failing());
        let outcome = h
            .orchestrator()
            .run(&query("Who won last night?", true, &[]), vec![])
            .await
            .unwrap();

        assert_eq!(outcome.answer, "generated answer");
        let prompt = h.prompt();
        assert!(!prompt.contains("quota exhausted"));
        assert!(!prompt.contains("Web Search Results"));
        assert_eq!(outcome.trace[1].details["outcome"], "failed");
    }

    #[tokio::test]
    async fn test_no_sources_returns_fixed_text() {
        for classified in [Route::Rag, Route::Web, Route::Answer] {
            let h = Harness::new(ScriptedClassifier::returning(classified, None));
            let outcome = h
                .orchestrator()
                .run(&query("Summarize my report", false, &[]), vec![])
                .await
                .unwrap();

            assert_eq!(outcome.answer, INSUFFICIENT_INFORMATION);
            assert_ne!(outcome.route, Route::Web);
            assert_eq!(h.generator.calls(), 0);
            assert_eq!(h.search.calls(), 0);
            assert_eq!(h.store.searches(), 0);
        }
    }

    #[tokio::test]
    async fn test_classifier_failure_aborts_turn() {
        let h = Harness::new(ScriptedClassifier::failing());
        let result = h.orchestrator().run(&query("anything", true, &["manual.pdf"]), vec![]).await;

        assert!(matches!(result, Err(AppError::ProviderUnavailable { .. })));
        assert_eq!(h.store.searches(), 0);
        assert_eq!(h.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_generator_failure_aborts_turn() {
        let h = Harness::new(ScriptedClassifier::returning(Route::Answer, None))
            .generator(ScriptedGenerator::failing());
        let result = h.orchestrator().run(&query("What can you do?", true, &[]), vec![]).await;
        tokio_test::assert_err!(result);
    }

    #[tokio::test]
    async fn test_conversation_is_appended() {
        let h = Harness::new(ScriptedClassifier::returning(Route::Answer, None));
        let history = vec![Message::user("earlier"), Message::assistant("earlier reply")];
        let outcome = h
            .orchestrator()
            .run(&query("What can you do?", true, &[]), history)
            .await
            .unwrap();

        let roles: Vec<Role> = outcome.conversation.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(outcome.conversation[2].content, "What can you do?");
        assert_eq!(outcome.conversation[3].content, "generated answer");
    }
}
