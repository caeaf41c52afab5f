//! The process graph — a data-declared routing table.
//!
//! Control flow is not hard-coded in step source: the graph is a table of
//! edges `{from, event, to, function, binding}`, a join table declaring which
//! step functions wait for multiple named parameters, and a set of stop
//! events. A generic dispatcher ([`super::engine::WorkflowEngine`])
//! interprets the table, which makes the wiring independently testable with
//! fake steps.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::events;

/// Identity of a step node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepId {
    Init,
    Triage,
    Faq,
    Rag,
    Orchestrator,
    AskUser,
    Reply,
}

impl StepId {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Triage => "triage",
            Self::Faq => "faq",
            Self::Rag => "rag",
            Self::Orchestrator => "orchestrator",
            Self::AskUser => "ask_user",
            Self::Reply => "reply",
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Where an event originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Injected by the service (`start_process`, `receive_user_message`).
    External,
    Step(StepId),
}

/// One routing entry: when `from` emits `event`, invoke `to.function`.
///
/// `binding` names the parameter slot for functions that join several
/// events; single-input functions leave it `None`.
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: Source,
    pub event: &'static str,
    pub to: StepId,
    pub function: &'static str,
    pub binding: Option<&'static str>,
}

/// The interpreted routing table.
#[derive(Debug, Clone, Default)]
pub struct ProcessGraph {
    pub edges: Vec<Edge>,
    /// `(step, function)` → ordered parameter names. A function listed here
    /// is invoked only once every parameter has arrived; parameter order is
    /// the merge order.
    joins: HashMap<(StepId, &'static str), Vec<&'static str>>,
    /// Events that terminate the run; the payload of the first one fired is
    /// the run's result.
    stops: HashSet<&'static str>,
}

impl ProcessGraph {
    pub fn builder() -> ProcessBuilder {
        ProcessBuilder::default()
    }

    /// Edges triggered by `event` from `source`.
    pub fn routes(&self, source: Source, event: &str) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| e.from == source && e.event == event)
            .collect()
    }

    /// Ordered parameter list for a joining function, if declared.
    pub fn join_params<'a>(&'a self, step: StepId, function: &'a str) -> Option<&'a [&'static str]> {
        self.joins.get(&(step, function)).map(|v| v.as_slice())
    }

    pub fn is_stop_event(&self, event: &str) -> bool {
        self.stops.contains(event)
    }
}

/// Assembles a [`ProcessGraph`].
#[derive(Debug, Default)]
pub struct ProcessBuilder {
    graph: ProcessGraph,
}

impl ProcessBuilder {
    /// Route `event` from `source` to `to.function`.
    pub fn edge(mut self, from: Source, event: &'static str, to: StepId, function: &'static str) -> Self {
        self.graph.edges.push(Edge {
            from,
            event,
            to,
            function,
            binding: None,
        });
        self
    }

    /// Route `event` into one named parameter of a joining function.
    pub fn edge_into(
        mut self,
        from: Source,
        event: &'static str,
        to: StepId,
        function: &'static str,
        binding: &'static str,
    ) -> Self {
        self.graph.edges.push(Edge {
            from,
            event,
            to,
            function,
            binding: Some(binding),
        });
        self
    }

    /// Declare a fan-in function and its parameter order.
    pub fn join(mut self, step: StepId, function: &'static str, params: &[&'static str]) -> Self {
        self.graph.joins.insert((step, function), params.to_vec());
        self
    }

    /// Declare a terminal event.
    pub fn stop_on(mut self, event: &'static str) -> Self {
        self.graph.stops.insert(event);
        self
    }

    pub fn build(self) -> ProcessGraph {
        self.graph
    }
}

/// The standard support workflow:
///
/// ```text
/// start_process ─► Init ─► {Triage, Faq, Rag, Orchestrator, AskUser, Reply}.init
///                   Triage.init ─► Triage.execute ─► {Faq, Rag}.execute
///                   Faq ──► Orchestrator.execute(faq_answers)  ┐ join
///                   Rag ──► Orchestrator.execute(rag_answers)  ┘
///                   Orchestrator ─► AskUser.execute   (suspend)
///                                └► Reply.execute ─► reply_sent (stop)
/// receive_user_message ─► Orchestrator.receive_user_response
/// ```
pub fn support_graph() -> ProcessGraph {
    use Source::{External, Step};

    ProcessGraph::builder()
        .edge(External, events::START_PROCESS, StepId::Init, "execute")
        // Init's result fans out to every step's init binding
        .edge(Step(StepId::Init), events::INITIALIZED, StepId::Triage, "init")
        .edge(Step(StepId::Init), events::INITIALIZED, StepId::Faq, "init")
        .edge(Step(StepId::Init), events::INITIALIZED, StepId::Rag, "init")
        .edge(Step(StepId::Init), events::INITIALIZED, StepId::Orchestrator, "init")
        .edge(Step(StepId::Init), events::INITIALIZED, StepId::AskUser, "init")
        .edge(Step(StepId::Init), events::INITIALIZED, StepId::Reply, "init")
        // Triage binds, then runs itself
        .edge(Step(StepId::Triage), events::TRIAGE_READY, StepId::Triage, "execute")
        // Extracted questions fan out to both knowledge sources
        .edge(Step(StepId::Triage), events::QUESTIONS_TRIAGED, StepId::Faq, "execute")
        .edge(Step(StepId::Triage), events::QUESTIONS_TRIAGED, StepId::Rag, "execute")
        // Both sources join at the orchestrator; FAQ merges before RAG
        .edge_into(
            Step(StepId::Faq),
            events::FAQ_ANSWERED,
            StepId::Orchestrator,
            "execute",
            "faq_answers",
        )
        .edge_into(
            Step(StepId::Rag),
            events::RAG_ANSWERED,
            StepId::Orchestrator,
            "execute",
            "rag_answers",
        )
        .join(
            StepId::Orchestrator,
            "execute",
            &["faq_answers", "rag_answers"],
        )
        // Decision fan-out
        .edge(
            Step(StepId::Orchestrator),
            events::ASK_USER_FOR_DETAILS,
            StepId::AskUser,
            "execute",
        )
        .edge(
            Step(StepId::Orchestrator),
            events::SEND_EMAIL_TO_CUSTOMER,
            StepId::Reply,
            "execute",
        )
        // Resumption entry point
        .edge(
            External,
            events::RECEIVE_USER_MESSAGE,
            StepId::Orchestrator,
            "receive_user_response",
        )
        .stop_on(events::REPLY_SENT)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_process_routes_to_init() {
        let graph = support_graph();
        let routes = graph.routes(Source::External, events::START_PROCESS);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].to, StepId::Init);
        assert_eq!(routes[0].function, "execute");
    }

    #[test]
    fn initialized_fans_out_to_all_steps() {
        let graph = support_graph();
        let routes = graph.routes(Source::Step(StepId::Init), events::INITIALIZED);
        assert_eq!(routes.len(), 6);
        assert!(routes.iter().all(|e| e.function == "init"));
    }

    #[test]
    fn orchestrator_execute_joins_faq_before_rag() {
        let graph = support_graph();
        let params = graph.join_params(StepId::Orchestrator, "execute").unwrap();
        assert_eq!(params, &["faq_answers", "rag_answers"]);

        let faq = graph.routes(Source::Step(StepId::Faq), events::FAQ_ANSWERED);
        assert_eq!(faq[0].binding, Some("faq_answers"));
        let rag = graph.routes(Source::Step(StepId::Rag), events::RAG_ANSWERED);
        assert_eq!(rag[0].binding, Some("rag_answers"));
    }

    #[test]
    fn reply_sent_is_the_only_stop() {
        let graph = support_graph();
        assert!(graph.is_stop_event(events::REPLY_SENT));
        assert!(!graph.is_stop_event(events::SEND_EMAIL_TO_CUSTOMER));
    }

    #[test]
    fn resumption_enters_at_receive_user_response() {
        let graph = support_graph();
        let routes = graph.routes(Source::External, events::RECEIVE_USER_MESSAGE);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].to, StepId::Orchestrator);
        assert_eq!(routes[0].function, "receive_user_response");
    }
}
