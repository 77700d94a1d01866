//! Tree-walking executor.
//!
//! `Executor` owns every piece of shell state: variable scopes, options,
//! aliases, functions and the job table. Nodes are dispatched by kind.
//! Control flow (`return`, `break`, `continue`, `exit`) travels upward as a
//! `Flow` value; `ShellError` is reserved for failures. Non-fatal errors are
//! reported where the failing command ran and turned into its status, so a
//! list keeps going. Fatal errors unwind to `execute`.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{atomic::AtomicI32, Arc};

use log::debug;
use nix::unistd::getpid;

use crate::alias::AliasStore;
use crate::ast::{FunctionDef, Node, SimpleCommand};
use crate::builtins;
use crate::error::{ShellError, ShellResult};
use crate::expansion::{self, ExpansionContext};
use crate::io_helpers::{report, shell_quote, write_stderr};
use crate::job_control::JobTable;
use crate::options::ShellOptions;
use crate::parse;
use crate::scope::{ScopeKind, ScopeStack};

mod compound;
mod functions;
mod redirection;
mod spawning;

pub use functions::MAX_FUNCTION_DEPTH;
pub use redirection::RedirectGuard;
pub use spawning::exit_status_code;

/// `while` and `until` give up after this many iterations.
pub const MAX_LOOP_ITERATIONS: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Normal(i32),
    Return(i32),
    /// Levels of enclosing loops still to leave.
    Break(usize),
    Continue(usize),
    Exit(i32),
}

impl Flow {
    pub fn status(&self) -> i32 {
        match *self {
            Flow::Normal(status) | Flow::Return(status) | Flow::Exit(status) => status,
            Flow::Break(_) | Flow::Continue(_) => 0,
        }
    }
}

pub struct Executor {
    scope: ScopeStack,
    options: ShellOptions,
    aliases: AliasStore,
    functions: HashMap<String, Rc<FunctionDef>>,
    jobs: JobTable,
    last_status: i32,
    /// Status of the last command substitution of the current command.
    subst_status: Option<i32>,
    last_bg_pid: Option<i32>,
    error: Option<ShellError>,
    exit_requested: Option<i32>,
    interactive: bool,
    debug: bool,
    /// Running in a child forked for a pipeline stage, subshell, background
    /// job or command substitution.
    forked: bool,
    shell_pid: i32,
    shell_pgid: i32,
    fg_pgid: Arc<AtomicI32>,
    script_name: String,
    loop_depth: usize,
    function_depth: usize,
    source_depth: usize,
    alias_depth: usize,
    errexit_suppressed: usize,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        let mut scope = ScopeStack::from_env();
        if scope.value("PWD").is_none() {
            if let Ok(dir) = std::env::current_dir() {
                let _ = scope.export("PWD", Some(dir.display().to_string()));
            }
        }
        Executor {
            scope,
            options: ShellOptions::default(),
            aliases: AliasStore::new(),
            functions: HashMap::new(),
            jobs: JobTable::new(),
            last_status: 0,
            subst_status: None,
            last_bg_pid: None,
            error: None,
            exit_requested: None,
            interactive: false,
            debug: false,
            forked: false,
            shell_pid: getpid().as_raw(),
            shell_pgid: 0,
            fg_pgid: Arc::new(AtomicI32::new(0)),
            script_name: "posish".to_string(),
            loop_depth: 0,
            function_depth: 0,
            source_depth: 0,
            alias_depth: 0,
            errexit_suppressed: 0,
        }
    }

    /// Dump every executed tree through `log::debug!`.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Process group owning the terminal while the shell waits for input.
    /// Job control is active once this is set on an interactive shell.
    pub fn set_shell_pgid(&mut self, pgid: i32) {
        self.shell_pgid = pgid;
    }

    pub fn set_script_name(&mut self, name: impl Into<String>) {
        self.script_name = name.into();
    }

    pub fn set_positional(&mut self, args: Vec<String>) {
        self.scope.set_positional(args);
    }

    pub fn options(&self) -> &ShellOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut ShellOptions {
        &mut self.options
    }

    pub fn scope(&self) -> &ScopeStack {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut ScopeStack {
        &mut self.scope
    }

    pub fn aliases(&self) -> &AliasStore {
        &self.aliases
    }

    pub fn aliases_mut(&mut self) -> &mut AliasStore {
        &mut self.aliases
    }

    pub fn last_status(&self) -> i32 {
        self.last_status
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn last_error(&self) -> Option<&ShellError> {
        self.error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub(crate) fn jobs_mut(&mut self) -> &mut JobTable {
        &mut self.jobs
    }

    /// Collect finished and stopped background jobs. Interactive shells
    /// announce the changes.
    pub fn reap_jobs(&mut self) {
        self.jobs.reap(self.interactive);
    }

    /// Process group of the foreground child, 0 when there is none.
    pub fn current_child(&self) -> Arc<AtomicI32> {
        Arc::clone(&self.fg_pgid)
    }

    /// Status the shell should exit with, once `exit` ran or a
    /// non-interactive shell hit a fatal error.
    pub fn exit_requested(&self) -> Option<i32> {
        self.exit_requested
    }

    pub(crate) fn request_exit(&mut self, status: i32) {
        debug!("exec event=exit status={}", status);
        self.exit_requested = Some(status);
    }

    pub(crate) fn job_control(&self) -> bool {
        self.interactive && !self.forked && self.shell_pgid > 0
    }

    pub(crate) fn shell_pgid(&self) -> i32 {
        self.shell_pgid
    }

    pub(crate) fn loop_depth(&self) -> usize {
        self.loop_depth
    }

    /// `return` is valid inside a function or a sourced file.
    pub(crate) fn can_return(&self) -> bool {
        self.function_depth > 0 || self.source_depth > 0
    }

    /// Run the text of a sourced file. Non-empty `args` replace the
    /// positional parameters until the file finishes.
    pub(crate) fn run_sourced(&mut self, source: &str, args: Vec<String>) -> ShellResult<Flow> {
        let node = parse::parse(source)?;
        let saved = if args.is_empty() {
            None
        } else {
            let old = self.scope.positional().to_vec();
            self.scope.set_positional(args);
            Some(old)
        };
        self.source_depth += 1;
        let result = self.exec_node(&node);
        self.source_depth -= 1;
        if let Some(old) = saved {
            self.scope.set_positional(old);
        }
        match result? {
            Flow::Return(status) => Ok(Flow::Normal(status)),
            other => Ok(other),
        }
    }

    pub fn execute(&mut self, node: &Node) -> i32 {
        if self.debug {
            debug!("exec event=ast kind={} tree={:?}", node.kind_name(), node);
        }
        if self.options.noexec && !self.interactive {
            return 0;
        }
        let status = match self.exec_node(node) {
            Ok(Flow::Exit(status)) => {
                self.request_exit(status);
                status
            }
            Ok(flow) => flow.status(),
            Err(err) => {
                let status = self.fail(err);
                if !self.interactive {
                    self.request_exit(status);
                }
                status
            }
        };
        self.last_status = status;
        status
    }

    /// Parse and execute `source`. A syntax error has status 2 and ends a
    /// non-interactive shell.
    pub fn run_source(&mut self, source: &str) -> i32 {
        match parse::parse(source) {
            Ok(node) => self.execute(&node),
            Err(err) if self.interactive => {
                report(err.display_with_input(source));
                let status = err.exit_status();
                self.error = Some(err);
                self.last_status = status;
                status
            }
            Err(err) => {
                let status = self.fail(err);
                self.last_status = status;
                self.request_exit(status);
                status
            }
        }
    }

    /// Parse and run `source` inside the current command, keeping its flow
    /// (`eval`, `source`, aliases).
    pub(crate) fn run_flow(&mut self, source: &str) -> ShellResult<Flow> {
        let node = parse::parse(source)?;
        if self.debug {
            debug!("exec event=ast kind={} tree={:?}", node.kind_name(), node);
        }
        self.exec_node(&node)
    }

    /// Report `err`, remember it and return the status it maps to.
    pub(crate) fn fail(&mut self, err: ShellError) -> i32 {
        report(&err);
        let status = err.exit_status();
        debug!("exec event=error kind={:?} status={} fatal={}", err.kind, status, err.fatal);
        self.error = Some(err);
        status
    }

    pub(crate) fn exec_node(&mut self, node: &Node) -> ShellResult<Flow> {
        let flow = match self.dispatch(node) {
            Err(err) if !err.fatal => Flow::Normal(self.fail(err)),
            other => other?,
        };
        if let Flow::Normal(status) = flow {
            self.last_status = status;
            if status != 0 && self.errexit_applies(node) {
                debug!("exec event=errexit status={}", status);
                return Ok(Flow::Exit(status));
            }
        }
        Ok(flow)
    }

    fn errexit_applies(&self, node: &Node) -> bool {
        if !self.options.errexit || self.errexit_suppressed > 0 {
            return false;
        }
        match node {
            Node::Command(_) | Node::Subshell(_) => true,
            Node::Pipeline(pipeline) => !pipeline.negated,
            _ => false,
        }
    }

    fn dispatch(&mut self, node: &Node) -> ShellResult<Flow> {
        match node {
            Node::Command(cmd) => self.exec_simple(cmd),
            Node::Pipeline(pipeline) => self.run_pipeline(pipeline),
            Node::And(left, right) => match self.suppressed(|this| this.exec_node(left))? {
                Flow::Normal(0) => self.exec_node(right),
                other => Ok(other),
            },
            Node::Or(left, right) => match self.suppressed(|this| this.exec_node(left))? {
                Flow::Normal(0) => Ok(Flow::Normal(0)),
                Flow::Normal(_) => self.exec_node(right),
                other => Ok(other),
            },
            Node::List(items) => {
                let mut status = 0;
                for item in items {
                    match self.exec_node(item)? {
                        Flow::Normal(item_status) => status = item_status,
                        other => return Ok(other),
                    }
                }
                Ok(Flow::Normal(status))
            }
            Node::Background(inner) => self.run_background(inner),
            Node::If(node) => self.exec_if(node),
            Node::While(node) => self.exec_loop(node, false),
            Node::Until(node) => self.exec_loop(node, true),
            Node::For(node) => self.exec_for(node),
            Node::Case(node) => self.exec_case(node),
            Node::Function(def) => {
                self.define_function(def);
                Ok(Flow::Normal(0))
            }
            Node::Subshell(inner) => self.run_subshell(node, inner),
            Node::BraceGroup(inner) => self.exec_node(inner),
            Node::Redirected(inner, redirects) => {
                let guard = RedirectGuard::apply(redirects, self)?;
                let flow = self.exec_node(inner);
                drop(guard);
                flow
            }
        }
    }

    /// Push a frame for the duration of `body`; popped on every path.
    pub(crate) fn with_scope<T>(
        &mut self,
        kind: ScopeKind,
        positional: Option<Vec<String>>,
        body: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let depth = self.scope.depth();
        self.scope.push(kind, positional);
        let result = body(self);
        self.scope.pop();
        debug_assert_eq!(self.scope.depth(), depth);
        result
    }

    /// Run `body` where a failure must not trigger `set -e`.
    pub(crate) fn suppressed<T>(&mut self, body: impl FnOnce(&mut Self) -> T) -> T {
        self.errexit_suppressed += 1;
        let result = body(self);
        self.errexit_suppressed -= 1;
        result
    }

    fn exec_simple(&mut self, cmd: &SimpleCommand) -> ShellResult<Flow> {
        if let Some(flow) = self.expand_alias(cmd) {
            return flow;
        }
        self.subst_status = None;
        let argv = expansion::expand_words(&cmd.words, self)?;
        if argv.is_empty() {
            return self.assign_only(cmd);
        }
        let mut bindings = Vec::with_capacity(cmd.assignments.len());
        for assignment in &cmd.assignments {
            if self.scope.get(&assignment.name).is_some_and(|var| var.readonly) {
                return Err(ShellError::execution(format!(
                    "{}: readonly variable",
                    assignment.name
                )));
            }
            let value = expansion::expand_assignment(assignment.value.as_str(), self)?;
            bindings.push((assignment.name.clone(), value));
        }
        if self.options.xtrace {
            trace(&bindings, &argv);
        }
        let guard = RedirectGuard::apply(&cmd.redirects, self)?;
        let flow = if bindings.is_empty() {
            self.run_command(&argv)
        } else {
            self.with_scope(ScopeKind::Command, None, |this| {
                for (name, value) in &bindings {
                    this.scope.bind_current(name, value.as_str(), true);
                }
                this.run_command(&argv)
            })
        };
        // Report while the command's own redirections are still in place.
        let flow = match flow {
            Err(err) if !err.fatal => Ok(Flow::Normal(self.fail(err))),
            other => other,
        };
        drop(guard);
        flow
    }

    fn assign_only(&mut self, cmd: &SimpleCommand) -> ShellResult<Flow> {
        for assignment in &cmd.assignments {
            let value = expansion::expand_assignment(assignment.value.as_str(), self)?;
            if self.options.xtrace {
                trace(&[(assignment.name.clone(), value.clone())], &[]);
            }
            self.scope.set(&assignment.name, value)?;
        }
        // Redirections on an empty command still create and truncate files.
        drop(RedirectGuard::apply(&cmd.redirects, self)?);
        Ok(Flow::Normal(self.subst_status.unwrap_or(0)))
    }

    /// Resolve and run an expanded command line: function, then builtin,
    /// then external program.
    pub(crate) fn run_command(&mut self, argv: &[String]) -> ShellResult<Flow> {
        let Some(name) = argv.first() else {
            return Ok(Flow::Normal(0));
        };
        if let Some(func) = self.functions.get(name.as_str()).cloned() {
            return self.call_function(func, argv);
        }
        if let Some(handler) = builtins::lookup(name) {
            return handler(self, argv);
        }
        self.run_external(argv).map(Flow::Normal)
    }

    /// Re-parse a command whose first word is an alias. The expansion runs
    /// with alias expansion turned off.
    fn expand_alias(&mut self, cmd: &SimpleCommand) -> Option<ShellResult<Flow>> {
        if self.alias_depth > 0 || self.aliases.is_empty() {
            return None;
        }
        let first = cmd.words.first()?;
        if !first.is_plain() {
            return None;
        }
        let replacement = self.aliases.expand(first.as_str())?;
        let mut source = String::new();
        for assignment in &cmd.assignments {
            source.push_str(&format!("{}={} ", assignment.name, assignment.value));
        }
        source.push_str(&replacement);
        let rest = SimpleCommand {
            assignments: Vec::new(),
            words: cmd.words[1..].to_vec(),
            redirects: cmd.redirects.clone(),
        };
        let tail = parse::regenerate(&Node::Command(rest));
        if !tail.is_empty() {
            source.push(' ');
            source.push_str(&tail);
        }
        debug!("exec event=alias name={} source={:?}", first, source);
        self.alias_depth += 1;
        let flow = self.run_flow(&source);
        self.alias_depth -= 1;
        Some(flow)
    }
}

fn trace(bindings: &[(String, String)], argv: &[String]) {
    let mut line = String::from("+");
    for (name, value) in bindings {
        line.push_str(&format!(" {}={}", name, shell_quote(value)));
    }
    for arg in argv {
        line.push(' ');
        line.push_str(&shell_quote(arg));
    }
    line.push('\n');
    let _ = write_stderr(&line);
}

impl ExpansionContext for Executor {
    fn lookup_var(&self, name: &str) -> Option<String> {
        match name {
            "?" => Some(self.last_status.to_string()),
            "$" => Some(self.shell_pid.to_string()),
            "!" => self.last_bg_pid.map(|pid| pid.to_string()),
            "-" => Some(self.options.flags(self.interactive)),
            "0" => Some(self.script_name.clone()),
            _ => self.scope.value(name).map(str::to_string),
        }
    }

    fn assign_var(&mut self, name: &str, value: &str) -> ShellResult<()> {
        self.scope.set(name, value)
    }

    fn positional(&self) -> Vec<String> {
        self.scope.positional().to_vec()
    }

    fn command_subst(&mut self, source: &str) -> ShellResult<String> {
        self.capture_output(source)
    }

    fn nounset(&self) -> bool {
        self.options.nounset
    }

    fn noglob(&self) -> bool {
        self.options.noglob
    }
}
