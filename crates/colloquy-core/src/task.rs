//! Tasks drive an agent turn by turn and delegate to sub-tasks
//!
//! Each step offers the pending message to the responders in a fixed order:
//! the agent's own handler, its LLM, then every sub-task in the order they
//! were added. The first responder that produces something wins and its reply
//! becomes the new pending message. The loop ends when the task's own LLM says
//! `DONE`, when a single-round task has produced one reply, when the turn limit
//! is hit, or when nobody can answer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::agent::{Agent, NullSink, OutputSink};
use crate::providers::ChatUsage;
use crate::types::{ChatDocument, Entity, strip_done};

type SubTaskFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<ChatDocument>>> + Send + 'a>>;

#[derive(Debug, Clone, Default)]
pub struct TaskConfig {
    /// Defaults to the agent's name
    pub name: Option<String>,
    /// Overrides the agent's system message when set
    pub system_message: Option<String>,
    /// Finish after the first valid response
    pub single_round: bool,
    /// Upper bound on steps per run
    pub max_turns: Option<usize>,
    /// Consecutive steps without any response before giving up (at least one)
    pub max_stalled_steps: usize,
}

impl TaskConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn system_message(mut self, system: impl Into<String>) -> Self {
        self.system_message = Some(system.into());
        self
    }

    pub fn single_round(mut self, single_round: bool) -> Self {
        self.single_round = single_round;
        self
    }

    pub fn max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }
}

/// Who produced the pending message, from this task's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Responder {
    /// The message the task was started with
    Input,
    Agent,
    Llm,
    SubTask(usize),
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Done,
    SingleRound,
    MaxTurns,
    Stalled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::SingleRound => write!(f, "single_round"),
            Self::MaxTurns => write!(f, "max_turns"),
            Self::Stalled => write!(f, "stalled"),
        }
    }
}

pub struct Task {
    name: String,
    agent: Box<dyn Agent>,
    single_round: bool,
    max_turns: Option<usize>,
    max_stalled_steps: usize,
    sub_tasks: Vec<Task>,
    sink: Arc<dyn OutputSink>,
    pending: Option<ChatDocument>,
    pending_from: Responder,
    result: Option<ChatDocument>,
    turns: usize,
    status: TaskStatus,
}

impl Task {
    pub fn new(agent: impl Agent + 'static, config: TaskConfig) -> Self {
        Self::from_boxed(Box::new(agent), config)
    }

    pub fn from_boxed(mut agent: Box<dyn Agent>, config: TaskConfig) -> Self {
        if let Some(system) = &config.system_message {
            agent.set_system_message(system.trim());
        }
        let name = config.name.unwrap_or_else(|| agent.name().to_string());
        Self {
            name,
            agent,
            single_round: config.single_round,
            max_turns: config.max_turns,
            max_stalled_steps: config.max_stalled_steps.max(1),
            sub_tasks: Vec::new(),
            sink: Arc::new(NullSink),
            pending: None,
            pending_from: Responder::Input,
            result: None,
            turns: 0,
            status: TaskStatus::Running,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Append children; they are consulted in the order given
    pub fn add_sub_task(&mut self, tasks: impl IntoIterator<Item = Task>) {
        for task in tasks {
            debug!("Task '{}': adding sub-task '{}'", self.name, task.name);
            self.sub_tasks.push(task);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn agent(&self) -> &dyn Agent {
        self.agent.as_ref()
    }

    pub fn sub_tasks(&self) -> &[Task] {
        &self.sub_tasks
    }

    pub fn is_single_round(&self) -> bool {
        self.single_round
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Steps taken in the current or most recent run
    pub fn turns(&self) -> usize {
        self.turns
    }

    /// Tokens spent by this task's agent and every sub-task
    pub fn total_usage(&self) -> ChatUsage {
        let mut usage = self.agent.usage();
        for sub in &self.sub_tasks {
            usage += sub.total_usage();
        }
        usage
    }

    /// Run until a termination condition holds.
    ///
    /// Without an initial message the task's LLM opens the conversation from
    /// its system prompt.
    pub async fn run(&mut self, msg: Option<ChatDocument>) -> Result<Option<ChatDocument>> {
        self.pending = msg;
        self.pending_from = Responder::Input;
        self.result = None;
        self.turns = 0;
        self.status = TaskStatus::Running;
        debug!("Task '{}' starting", self.name);

        let mut stalled = 0;
        loop {
            if let Some(status) = self.check_done(stalled) {
                self.status = status;
                break;
            }
            if self.step().await? {
                stalled = 0;
            } else {
                stalled += 1;
            }
            self.turns += 1;
        }

        debug!(
            "Task '{}' finished after {} turns ({})",
            self.name, self.turns, self.status
        );

        let mut result = self.result.take();
        if self.status == TaskStatus::Done {
            if let Some(doc) = result.as_mut() {
                doc.content = strip_done(&doc.content);
            }
        }
        Ok(result)
    }

    fn check_done(&self, stalled: usize) -> Option<TaskStatus> {
        if self.pending_from == Responder::Llm
            && self.pending.as_ref().is_some_and(ChatDocument::is_done)
        {
            info!("Task '{}' is done", self.name);
            return Some(TaskStatus::Done);
        }
        if self.single_round && self.result.is_some() {
            return Some(TaskStatus::SingleRound);
        }
        if self.max_turns.is_some_and(|max| self.turns >= max) {
            warn!("Task '{}' reached its turn limit", self.name);
            return Some(TaskStatus::MaxTurns);
        }
        if stalled >= self.max_stalled_steps {
            debug!(
                "Task '{}' stalled: nobody could answer {:?}",
                self.name,
                self.pending.as_ref().map(|m| &m.sender_name)
            );
            return Some(TaskStatus::Stalled);
        }
        None
    }

    /// Offer the pending message to each responder in turn. Returns whether
    /// anyone responded.
    pub async fn step(&mut self) -> Result<bool> {
        let pending = self.pending.clone();

        if let Some(msg) = &pending {
            if self.can_respond(Responder::Agent, msg) {
                if let Some(reply) = self.agent.agent_response(msg).await? {
                    self.accept(reply, Responder::Agent);
                    return Ok(true);
                }
            }
        }

        let llm_may_answer = match &pending {
            Some(msg) => self.can_respond(Responder::Llm, msg),
            None => true,
        };
        if self.agent.has_llm() && llm_may_answer {
            if let Some(reply) = self.agent.llm_response(pending.as_ref()).await? {
                self.accept(reply, Responder::Llm);
                return Ok(true);
            }
        }

        if let Some(msg) = pending {
            for idx in 0..self.sub_tasks.len() {
                if !self.can_respond(Responder::SubTask(idx), &msg) {
                    continue;
                }
                debug!(
                    "Task '{}': delegating to '{}'",
                    self.name, self.sub_tasks[idx].name
                );
                if let Some(mut reply) = self.run_sub_task(idx, msg.clone()).await? {
                    reply.sender = Entity::Agent;
                    reply.sender_name = self.sub_tasks[idx].name.clone();
                    self.accept(reply, Responder::SubTask(idx));
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    fn run_sub_task(&mut self, idx: usize, msg: ChatDocument) -> SubTaskFuture<'_> {
        Box::pin(self.sub_tasks[idx].run(Some(msg)))
    }

    /// A responder never answers its own message, and only answers messages
    /// addressed to it unless it accepts any recipient.
    fn can_respond(&self, responder: Responder, msg: &ChatDocument) -> bool {
        if responder == self.pending_from {
            return false;
        }
        match responder {
            Responder::Input => false,
            Responder::Agent => self.agent.accepts_any_recipient() || msg.is_for(&self.name),
            Responder::Llm => msg.is_for(&self.name),
            Responder::SubTask(idx) => {
                let sub = &self.sub_tasks[idx];
                sub.agent.accepts_any_recipient() || msg.is_for(&sub.name)
            }
        }
    }

    fn accept(&mut self, mut reply: ChatDocument, from: Responder) {
        if matches!(from, Responder::Agent | Responder::Llm) {
            reply.sender_name = self.name.clone();
            self.sink.on_message(&reply);
        }
        debug!(
            "Task '{}': {} ({}) -> {:?}",
            self.name, reply.sender_name, reply.sender, reply.recipient
        );
        self.result = Some(reply.clone());
        self.pending = Some(reply);
        self.pending_from = from;
    }
}
