//! Counterexample translation
//!
//! Backend-specific trace dialects are parsed into one neutral event
//! sequence, then rendered against the source vocabulary. The neutral
//! form also serializes to JSON lines for downstream tooling.

pub mod cprover;
pub mod lnt;
pub mod nuxmv;

use serde::Serialize;
use sha2::{Digest, Sha256};

use swarm_spec::{Info, Store};

/// Store tag in the neutral trace form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StoreTag {
    I,
    L,
    E,
}

impl From<StoreTag> for Store {
    fn from(tag: StoreTag) -> Store {
        match tag {
            StoreTag::I => Store::Iface,
            StoreTag::L => Store::Lstig,
            StoreTag::E => Store::Env,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StigmergyKind {
    Propagate,
    Confirm,
}

impl StigmergyKind {
    pub fn name(&self) -> &'static str {
        match self {
            StigmergyKind::Propagate => "propagate",
            StigmergyKind::Confirm => "confirm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Satisfied,
    Violated { property: Option<String> },
    Deadlock,
}

/// One neutral trace event. `Step` values are monotone non-decreasing
/// within a well-formed trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    InitAssign {
        store: StoreTag,
        agent: Option<usize>,
        index: usize,
        value: String,
    },
    Step {
        k: u64,
    },
    Assign {
        store: StoreTag,
        agent: Option<usize>,
        index: usize,
        value: String,
        /// Agent that sent a stigmergic message, when the assignment
        /// came from another agent.
        sender: Option<usize>,
    },
    Stigmergy {
        kind: StigmergyKind,
        agent: usize,
        key: String,
    },
    StigmergyEnd {
        kind: StigmergyKind,
    },
    Spurious,
    Comment {
        text: String,
    },
    Property {
        outcome: Outcome,
    },
    Unparsed {
        text: String,
    },
}

/// True when `Step` events never decrease.
pub fn steps_monotone(events: &[Event]) -> bool {
    let mut last = 0u64;
    for e in events {
        if let Event::Step { k } = e {
            if *k < last {
                return false;
            }
            last = *k;
        }
    }
    true
}

/// Render the neutral events in the source-level format.
pub fn render_events(events: &[Event], info: &Info) -> String {
    let mut out = String::from("<initialization>");
    let mut init_open = true;

    for e in events {
        if init_open && !matches!(e, Event::InitAssign { .. }) {
            out.push_str("\n<end initialization>");
            init_open = false;
        }
        match e {
            Event::InitAssign {
                store,
                agent,
                index,
                value,
            }
            | Event::Assign {
                store,
                agent,
                index,
                value,
                sender: None,
            } => {
                out.push('\n');
                out.push_str(&assign_line(*store, *agent, *index, value, info));
            }
            Event::Assign {
                store,
                agent,
                index,
                value,
                sender: Some(sender),
            } => {
                out.push('\n');
                out.push_str(&assign_line(*store, *agent, *index, value, info));
                out.push_str(&format!("\t(from {})", info.pprint_agent(*sender)));
            }
            Event::Step { k } => out.push_str(&format!("\n<step {}>", k)),
            Event::Stigmergy { kind, agent, key } => out.push_str(&format!(
                "\n<{}: {} '{}'>",
                info.pprint_agent(*agent),
                kind.name(),
                key
            )),
            Event::StigmergyEnd { kind } => {
                out.push_str(&format!("\n<end {}>", kind.name()))
            }
            Event::Spurious => out.push_str("\n<spurious>"),
            Event::Comment { text } => out.push_str(&format!("\n<{}>", text)),
            Event::Property { outcome } => match outcome {
                Outcome::Satisfied => out.push_str("\n<property satisfied>"),
                Outcome::Violated { property: Some(p) } => {
                    out.push_str(&format!("\n<property violated: '{}'>", p))
                }
                Outcome::Violated { property: None } => {
                    out.push_str("\n<property violated>")
                }
                Outcome::Deadlock => out.push_str("\n<deadlock>"),
            },
            Event::Unparsed { text } => {
                out.push_str(&format!("\n<could not parse: {}>", text))
            }
        }
    }
    if init_open {
        out.push_str("\n<end initialization>");
    }
    out.push('\n');
    out
}

fn assign_line(
    store: StoreTag,
    agent: Option<usize>,
    index: usize,
    value: &str,
    info: &Info,
) -> String {
    let assign = info.pprint_assign(store.into(), index, value);
    match agent {
        Some(tid) => format!("{}:\t{}", info.pprint_agent(tid), assign),
        None => format!("\t{}", assign),
    }
}

/// Render the neutral events as JSON lines.
pub fn render_json(events: &[Event]) -> String {
    let mut out = String::new();
    for e in events {
        if let Ok(line) = serde_json::to_string(e) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

/// Hex digest of a rendered trace, for distinctness reporting across
/// simulation runs.
pub fn trace_digest(rendered: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rendered.as_bytes());
    hex::encode(hasher.finalize())
}
