//! User Agent
//!
//! Reads the user's reply from a [`LineSource`]: stdin in a normal run, a
//! scripted queue in tests or embedding hosts. Every User node built from
//! a config reads through the same stdin buffer, so lines typed ahead for
//! one agent stay queued for the next.

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};
use workflow_engine::{
    Agent, AgentOperator, BuildContext, FactoryRegistration, FlowValue, Msg, NodeKind,
    NodeRequest, Operator, Role, Scope,
};

use crate::error::Result;

/// Where user input comes from
#[async_trait]
pub trait LineSource: Send + Sync {
    /// Show `prompt` and read one line; `None` at end of input
    async fn read_line(&self, prompt: &str) -> Result<Option<String>>;
}

/// Lines typed on the process's stdin
pub struct StdinLines {
    reader: tokio::sync::Mutex<BufReader<Stdin>>,
}

impl StdinLines {
    pub fn new() -> Self {
        Self {
            reader: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

impl Default for StdinLines {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LineSource for StdinLines {
    async fn read_line(&self, prompt: &str) -> Result<Option<String>> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;

        let mut line = String::new();
        let n = self.reader.lock().await.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

static STDIN: OnceLock<Arc<StdinLines>> = OnceLock::new();

/// The process-wide stdin source
pub fn shared_stdin() -> Arc<dyn LineSource> {
    STDIN.get_or_init(|| Arc::new(StdinLines::new())).clone()
}

/// A fixed queue of lines
#[derive(Default)]
pub struct ScriptedLines {
    lines: Mutex<VecDeque<String>>,
}

impl ScriptedLines {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: Mutex::new(lines.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl LineSource for ScriptedLines {
    async fn read_line(&self, _prompt: &str) -> Result<Option<String>> {
        Ok(self.lines.lock().pop_front())
    }
}

pub struct UserAgent {
    name: String,
    source: Arc<dyn LineSource>,
}

impl UserAgent {
    pub fn new(name: impl Into<String>, source: Arc<dyn LineSource>) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }
}

#[async_trait]
impl Agent for UserAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn reply(&self, _input: FlowValue, scope: &Scope<'_>) -> workflow_engine::Result<Msg> {
        let prompt = format!("{} Input: ", self.name);
        let line = match self.source.read_line(&prompt).await? {
            Some(line) => line,
            None => {
                log::warn!("{}: end of input, replying with empty content", self.name);
                String::new()
            }
        };
        let msg = Msg::new(&self.name, line, Role::User);
        scope.speak(&msg);
        Ok(msg)
    }

    // The user follows the conversation through the transcript
    fn observe(&self, _msg: &Msg) {}
}

fn build(
    request: &NodeRequest<'_>,
    _ctx: &mut BuildContext<'_>,
) -> workflow_engine::Result<Arc<dyn Operator>> {
    let name = request.args().str_or("name", "User")?;
    let agent = UserAgent::new(name, shared_stdin());
    Ok(Arc::new(AgentOperator::new(
        request.node_id,
        NodeKind::UserAgent,
        Arc::new(agent),
    )))
}

inventory::submit!(FactoryRegistration {
    kind: NodeKind::UserAgent,
    factory: build,
});

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_engine::{OperatorTable, VecEventSink};

    #[tokio::test]
    async fn test_replies_with_scripted_lines() {
        let agent = UserAgent::new("User", Arc::new(ScriptedLines::new(["first", "second"])));
        let table = OperatorTable::new();
        let sink = VecEventSink::new();
        let scope = Scope::new(&table, &sink, "r");

        assert_eq!(agent.reply(FlowValue::Null, &scope).await.unwrap().text(), "first");
        let second = agent.reply(FlowValue::Null, &scope).await.unwrap();
        assert_eq!(second.text(), "second");
        assert_eq!(second.role, Role::User);

        let exhausted = agent.reply(FlowValue::Null, &scope).await.unwrap();
        assert_eq!(exhausted.text(), "");
        assert_eq!(sink.spoken().len(), 3);
    }

    #[tokio::test]
    async fn test_agents_share_one_source() {
        let source: Arc<dyn LineSource> = Arc::new(ScriptedLines::new(["from alice", "from bob"]));
        let alice = UserAgent::new("Alice", source.clone());
        let bob = UserAgent::new("Bob", source);
        let table = OperatorTable::new();
        let sink = VecEventSink::new();
        let scope = Scope::new(&table, &sink, "r");

        assert_eq!(alice.reply(FlowValue::Null, &scope).await.unwrap().text(), "from alice");
        assert_eq!(bob.reply(FlowValue::Null, &scope).await.unwrap().text(), "from bob");
    }

    #[test]
    fn test_built_agents_read_the_same_stdin() {
        assert!(Arc::ptr_eq(&shared_stdin(), &shared_stdin()));
    }
}
