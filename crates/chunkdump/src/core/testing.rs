//! Scripted connections for driver-free tests.
//!
//! A [`Script`] is an ordered list of expected statements with canned replies.
//! Every connection handed out by a [`ScriptedFactory`] draws from the same
//! script, so statement order across connections is asserted too.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::traits::{ConnectionFactory, ResultSet, SessionParams, SqlConn};
use crate::error::{DbError, DumpError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Query,
    Exec,
}

enum Reply {
    Rows(ResultSet),
    Done,
    Fail(DbError),
}

struct Step {
    op: Op,
    pattern: String,
    reply: Reply,
}

#[derive(Default)]
struct ScriptState {
    steps: VecDeque<Step>,
    executed: Vec<String>,
}

/// Shared, ordered expectations.
#[derive(Clone, Default)]
pub(crate) struct Script {
    state: Arc<Mutex<ScriptState>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, op: Op, pattern: &str, reply: Reply) -> &Self {
        self.state.lock().unwrap().steps.push_back(Step {
            op,
            pattern: pattern.to_string(),
            reply,
        });
        self
    }

    /// Expect a query whose text contains `pattern`.
    pub fn expect_query(&self, pattern: &str, rows: ResultSet) -> &Self {
        self.push(Op::Query, pattern, Reply::Rows(rows))
    }

    pub fn expect_query_error(&self, pattern: &str, err: DbError) -> &Self {
        self.push(Op::Query, pattern, Reply::Fail(err))
    }

    /// Expect a statement executed through [`SqlConn::exec`].
    pub fn expect_exec(&self, pattern: &str) -> &Self {
        self.push(Op::Exec, pattern, Reply::Done)
    }

    pub fn expect_exec_error(&self, pattern: &str, err: DbError) -> &Self {
        self.push(Op::Exec, pattern, Reply::Fail(err))
    }

    pub fn conn(&self) -> ScriptedConn {
        ScriptedConn {
            script: self.clone(),
        }
    }

    /// Every statement run so far, with `args` appended as ` -- [..]` when present.
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn assert_done(&self) {
        let state = self.state.lock().unwrap();
        let pending: Vec<&str> = state.steps.iter().map(|s| s.pattern.as_str()).collect();
        assert!(pending.is_empty(), "unmet expectations: {:?}", pending);
    }

    fn next(&self, op: Op, sql: &str, args: &[String]) -> Result<ResultSet> {
        let mut state = self.state.lock().unwrap();
        let record = if args.is_empty() {
            sql.to_string()
        } else {
            format!("{} -- {:?}", sql, args)
        };
        state.executed.push(record);
        let step = state
            .steps
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected {:?}: {}", op, sql));
        assert_eq!(step.op, op, "expected {:?} matching {:?}, got {}", step.op, step.pattern, sql);
        assert!(
            sql.contains(&step.pattern),
            "expected statement matching {:?}, got {}",
            step.pattern,
            sql
        );
        match step.reply {
            Reply::Rows(rows) => Ok(rows),
            Reply::Done => Ok(ResultSet::default()),
            Reply::Fail(err) => Err(DumpError::query(sql, args, err)),
        }
    }
}

pub(crate) struct ScriptedConn {
    script: Script,
}

#[async_trait]
impl SqlConn for ScriptedConn {
    async fn query(&mut self, sql: &str) -> Result<ResultSet> {
        self.script.next(Op::Query, sql, &[])
    }

    async fn query_with_args(&mut self, sql: &str, args: &[String]) -> Result<ResultSet> {
        self.script.next(Op::Query, sql, args)
    }

    async fn exec(&mut self, sql: &str) -> Result<()> {
        self.script.next(Op::Exec, sql, &[]).map(|_| ())
    }
}

/// Factory whose connections all share one [`Script`].
pub(crate) struct ScriptedFactory {
    script: Script,
    sessions: Mutex<Vec<SessionParams>>,
    fail_after: Option<usize>,
}

impl ScriptedFactory {
    pub fn new(script: &Script) -> Self {
        Self {
            script: script.clone(),
            sessions: Mutex::new(Vec::new()),
            fail_after: None,
        }
    }

    /// Refuse every connection after the first `n`.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Session parameters passed to each `connect` call, in order.
    pub fn sessions(&self) -> Vec<SessionParams> {
        self.sessions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionFactory for ScriptedFactory {
    async fn connect(&self, session: &SessionParams) -> Result<Box<dyn SqlConn>> {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(limit) = self.fail_after {
            if sessions.len() >= limit {
                return Err(DumpError::connection("refused", "scripted factory"));
            }
        }
        sessions.push(session.clone());
        Ok(Box::new(self.script.conn()))
    }
}

/// Build a result set from string cells; `None` is NULL.
pub(crate) fn rows(columns: &[&str], data: &[&[Option<&str>]]) -> ResultSet {
    ResultSet::new(
        columns.iter().map(|c| c.to_string()).collect(),
        data.iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.map(|v| v.as_bytes().to_vec()))
                    .collect()
            })
            .collect(),
    )
}

/// Build a result set where every cell is non-NULL.
pub(crate) fn text_rows(columns: &[&str], data: &[&[&str]]) -> ResultSet {
    ResultSet::new(
        columns.iter().map(|c| c.to_string()).collect(),
        data.iter()
            .map(|row| row.iter().map(|v| Some(v.as_bytes().to_vec())).collect())
            .collect(),
    )
}
