use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::env::Environment;
use super::value::{AsyncTask, PromiseData, Value};

/// Which back-end executes function bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Interpret,
    Compile,
}

/// The program-wide standard-output sink `console.log` writes to.
pub trait OutputSink {
    fn write_line(&mut self, line: &str);
}

pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_line(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Collects output in memory so tests can compare both execution modes
/// byte for byte.
#[derive(Default)]
pub struct BufferSink {
    pub buffer: String,
}

impl OutputSink for BufferSink {
    fn write_line(&mut self, line: &str) {
        self.buffer.push_str(line);
        self.buffer.push('\n');
    }
}

/// A pending resumption of a suspended async task. Jobs are serviced in
/// FIFO order of settlement.
pub struct Job {
    pub task: Rc<RefCell<AsyncTask>>,
    pub input: Result<Value, Value>,
}

/// One execution context: non-reentrant, owned by a single run of a
/// program in one mode.
pub struct Context {
    pub mode: ExecMode,
    pub output: Rc<RefCell<dyn OutputSink>>,
    pub jobs: VecDeque<Job>,
    pub global: Environment,
    /// Promises rejected with nobody listening; surfaced after the job
    /// queue drains.
    pub rejected: Vec<Rc<RefCell<PromiseData>>>,
}

impl Context {
    pub fn new(mode: ExecMode, output: Rc<RefCell<dyn OutputSink>>) -> Self {
        let global = Environment::global();
        super::builtins::install_globals(&global);
        Context {
            mode,
            output,
            jobs: VecDeque::new(),
            global,
            rejected: vec![],
        }
    }

    pub fn write_line(&mut self, line: &str) {
        self.output.borrow_mut().write_line(line);
    }

    pub fn enqueue(&mut self, job: Job) {
        self.jobs.push_back(job);
    }
}
