//! Query-routing core
//!
//! Decides per question whether to consult the document knowledge base, search
//! the web, answer directly or reply conversationally, then assembles the
//! final answer from whatever context was gathered.
//!
//! All external services sit behind the traits in [`collaborators`].

pub mod answer;
pub mod collaborators;
#[cfg(any(test, feature = "test-util"))]
pub mod fakes;
pub mod judge;
pub mod orchestrator;
pub mod retrieval;
pub mod router;
pub mod state;
pub mod trace;
pub mod web;

pub use answer::{AnswerAssembly, AnswerSource, INSUFFICIENT_INFORMATION};
pub use collaborators::{
    Classifier, Generator, Judge, RouteDecision, SimilarityStore, Verdict, WebResult,
    WebSearchProvider,
};
pub use judge::SufficiencyJudge;
pub use orchestrator::{Collaborators, Orchestrator, Stage, TurnOutcome, TurnSettings};
pub use retrieval::{KnowledgeRetrieval, Retrieval};
pub use router::{IntentRouter, Routing};
pub use state::{Message, Query, Role, Route, TurnState, WebContext};
pub use trace::TraceEvent;
pub use web::WebFallback;
