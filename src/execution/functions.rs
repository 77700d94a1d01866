//! Function definition and calls.
//!
//! Bodies are shared through `Rc` so a call keeps its body alive even if the
//! function redefines or unsets itself while running.

use std::rc::Rc;

use log::debug;

use crate::ast::FunctionDef;
use crate::error::{ShellError, ShellResult};
use crate::expansion;
use crate::scope::ScopeKind;

use super::{Executor, Flow};

/// Nested calls beyond this depth fail instead of exhausting the stack.
pub const MAX_FUNCTION_DEPTH: usize = 100;

impl Executor {
    pub(crate) fn define_function(&mut self, def: &FunctionDef) {
        debug!("exec event=define name={}", def.name);
        self.functions.insert(def.name.clone(), Rc::new(def.clone()));
    }

    pub(crate) fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name).map(Rc::as_ref)
    }

    pub(crate) fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub(crate) fn remove_function(&mut self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    pub(super) fn call_function(&mut self, func: Rc<FunctionDef>, argv: &[String]) -> ShellResult<Flow> {
        if self.function_depth >= MAX_FUNCTION_DEPTH {
            return Err(ShellError::execution(format!(
                "{}: maximum function nesting level exceeded ({})",
                func.name, MAX_FUNCTION_DEPTH
            )));
        }
        let args = argv[1..].to_vec();
        debug!("exec event=call name={} argc={}", func.name, args.len());
        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        let saved_aliases = std::mem::replace(&mut self.alias_depth, 0);
        self.function_depth += 1;
        let result = self.with_scope(ScopeKind::Function, Some(args.clone()), |this| {
            this.bind_params(&func, &args)?;
            this.exec_node(&func.body)
        });
        self.function_depth -= 1;
        self.loop_depth = saved_loops;
        self.alias_depth = saved_aliases;
        match result? {
            Flow::Return(status) | Flow::Normal(status) => Ok(Flow::Normal(status)),
            // A stray break or continue ends at the function boundary.
            Flow::Break(_) | Flow::Continue(_) => Ok(Flow::Normal(0)),
            Flow::Exit(status) => Ok(Flow::Exit(status)),
        }
    }

    /// Bind declared parameters as locals. Defaults are expanded in the new
    /// frame, so they can refer to earlier parameters.
    fn bind_params(&mut self, func: &FunctionDef, args: &[String]) -> ShellResult<()> {
        let Some(params) = &func.params else {
            return Ok(());
        };
        for (index, param) in params.iter().enumerate() {
            let value = match (args.get(index), &param.default) {
                (Some(arg), _) => arg.clone(),
                (None, Some(default)) => expansion::expand_assignment(default.as_str(), self)?,
                (None, None) => {
                    return Err(ShellError::execution(format!(
                        "{}: missing argument `{}'",
                        func.name, param.name
                    ))
                    .with_status(2));
                }
            };
            self.scope.set_local(&param.name, Some(value))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::execution::{Executor, MAX_FUNCTION_DEPTH};

    fn value(exec: &Executor, name: &str) -> Option<String> {
        exec.scope().value(name).map(str::to_string)
    }

    #[test]
    fn return_value_becomes_status() {
        let mut exec = Executor::new();
        assert_eq!(exec.run_source("f() { return 7; echo no; }; f"), 7);
        assert_eq!(exec.scope().depth(), 1);
    }

    #[test]
    fn positional_parameters_are_per_call() {
        let mut exec = Executor::new();
        exec.set_positional(vec!["outer".into()]);
        exec.run_source("f() { inner=$1; count=$#; }; f a b c; after=$1");
        assert_eq!(value(&exec, "inner").as_deref(), Some("a"));
        assert_eq!(value(&exec, "count").as_deref(), Some("3"));
        assert_eq!(value(&exec, "after").as_deref(), Some("outer"));
    }

    #[test]
    fn locals_do_not_leak() {
        let mut exec = Executor::new();
        exec.run_source("x=global; f() { local x=inner; y=$x; }; f");
        assert_eq!(value(&exec, "x").as_deref(), Some("global"));
        assert_eq!(value(&exec, "y").as_deref(), Some("inner"));
    }

    #[test]
    fn named_parameters_and_defaults() {
        let mut exec = Executor::new();
        exec.run_source("greet(who, greeting=hello) { msg=\"$greeting $who\"; }; greet world");
        assert_eq!(value(&exec, "msg").as_deref(), Some("hello world"));
        assert_eq!(value(&exec, "who"), None);
        assert_eq!(exec.run_source("greet"), 2);
        assert_eq!(exec.scope().depth(), 1);
    }

    #[test]
    fn break_inside_function_does_not_escape() {
        let mut exec = Executor::new();
        exec.run_source("f() { break; }; n=0; for i in 1 2 3; do f; n=$((n+1)); done");
        assert_eq!(value(&exec, "n").as_deref(), Some("3"));
    }

    #[test]
    fn runaway_recursion_is_an_error() {
        // Libtest threads get 2 MiB of stack, less than an unoptimised
        // chain of MAX_FUNCTION_DEPTH calls through the executor needs.
        let handle = std::thread::Builder::new()
            .stack_size(16 * 1024 * 1024)
            .spawn(|| {
                let mut exec = Executor::new();
                let status = exec.run_source("f() { f; }; f");
                assert_ne!(status, 0);
                assert!(exec.last_error().is_some_and(|err| err
                    .message
                    .contains(&MAX_FUNCTION_DEPTH.to_string())));
                assert_eq!(exec.scope().depth(), 1);
            })
            .unwrap();
        handle.join().unwrap();
    }
}
