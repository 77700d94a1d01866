//! Conditionals, loops and `case`.

use log::debug;

use crate::ast::{CaseNode, ForNode, IfNode, LoopNode};
use crate::error::{ShellError, ShellResult};
use crate::expansion::{self, glob_match};
use crate::scope::ScopeKind;

use super::{Executor, Flow, MAX_LOOP_ITERATIONS};

enum LoopStep {
    Next(i32),
    Stop,
    Leave(Flow),
}

/// What a loop does with the flow of one body run.
fn loop_step(flow: Flow) -> LoopStep {
    match flow {
        Flow::Normal(status) => LoopStep::Next(status),
        Flow::Break(levels) if levels > 1 => LoopStep::Leave(Flow::Break(levels - 1)),
        Flow::Break(_) => LoopStep::Stop,
        Flow::Continue(levels) if levels > 1 => LoopStep::Leave(Flow::Continue(levels - 1)),
        Flow::Continue(_) => LoopStep::Next(0),
        other => LoopStep::Leave(other),
    }
}

impl Executor {
    pub(super) fn exec_if(&mut self, node: &IfNode) -> ShellResult<Flow> {
        for (condition, body) in &node.branches {
            match self.suppressed(|this| this.exec_node(condition))? {
                Flow::Normal(0) => return self.exec_node(body),
                Flow::Normal(_) => continue,
                other => return Ok(other),
            }
        }
        match &node.else_branch {
            Some(body) => self.exec_node(body),
            None => Ok(Flow::Normal(0)),
        }
    }

    /// `while` loops run while the condition succeeds, `until` loops while
    /// it fails.
    pub(super) fn exec_loop(&mut self, node: &LoopNode, until: bool) -> ShellResult<Flow> {
        self.loop_depth += 1;
        let result = self.loop_iterations(node, until);
        self.loop_depth -= 1;
        result
    }

    fn loop_iterations(&mut self, node: &LoopNode, until: bool) -> ShellResult<Flow> {
        let keyword = if until { "until" } else { "while" };
        let mut status = 0;
        let mut iterations = 0usize;
        loop {
            let condition = match self.suppressed(|this| this.exec_node(&node.condition))? {
                Flow::Normal(condition) => condition,
                other => return Ok(other),
            };
            if (condition == 0) == until {
                break;
            }
            iterations += 1;
            if iterations > MAX_LOOP_ITERATIONS {
                debug!("exec event=loop-limit keyword={}", keyword);
                return Err(ShellError::execution(format!(
                    "{}: loop exceeded {} iterations",
                    keyword, MAX_LOOP_ITERATIONS
                )));
            }
            match loop_step(self.exec_node(&node.body)?) {
                LoopStep::Next(body_status) => status = body_status,
                LoopStep::Stop => {
                    status = 0;
                    break;
                }
                LoopStep::Leave(flow) => return Ok(flow),
            }
        }
        Ok(Flow::Normal(status))
    }

    pub(super) fn exec_for(&mut self, node: &ForNode) -> ShellResult<Flow> {
        if self.scope.get(&node.var).is_some_and(|var| var.readonly) {
            return Err(ShellError::execution(format!("{}: readonly variable", node.var)));
        }
        let items = match &node.words {
            Some(words) => expansion::expand_words(words, self)?,
            None => self.scope.positional().to_vec(),
        };
        self.loop_depth += 1;
        let result = self.with_scope(ScopeKind::Loop, None, |this| {
            let mut status = 0;
            for item in &items {
                this.scope.bind_current(&node.var, item.as_str(), false);
                match loop_step(this.exec_node(&node.body)?) {
                    LoopStep::Next(body_status) => status = body_status,
                    LoopStep::Stop => {
                        status = 0;
                        break;
                    }
                    LoopStep::Leave(flow) => return Ok(flow),
                }
            }
            Ok(Flow::Normal(status))
        });
        self.loop_depth -= 1;
        result
    }

    pub(super) fn exec_case(&mut self, node: &CaseNode) -> ShellResult<Flow> {
        let subject = expansion::expand_word_single(node.word.as_str(), self)?;
        for arm in &node.arms {
            for pattern in &arm.patterns {
                let pattern = expansion::expand_pattern(pattern.as_str(), self)?;
                if glob_match(&pattern, &subject) {
                    debug!("exec event=case subject={:?} pattern={:?}", subject, pattern);
                    return match &arm.body {
                        Some(body) => self.exec_node(body),
                        None => Ok(Flow::Normal(0)),
                    };
                }
            }
        }
        Ok(Flow::Normal(0))
    }
}

#[cfg(test)]
mod tests {
    use crate::execution::Executor;

    fn value(exec: &Executor, name: &str) -> Option<String> {
        exec.scope().value(name).map(str::to_string)
    }

    #[test]
    fn if_elif_else() {
        let mut exec = Executor::new();
        exec.run_source("if false; then r=a; elif true; then r=b; else r=c; fi");
        assert_eq!(value(&exec, "r").as_deref(), Some("b"));
        assert_eq!(exec.run_source("if false; then :; fi"), 0);
    }

    #[test]
    fn while_and_until_count() {
        let mut exec = Executor::new();
        exec.run_source("i=0; while [ $i -lt 5 ]; do i=$((i+1)); done");
        assert_eq!(value(&exec, "i").as_deref(), Some("5"));
        exec.run_source("j=0; until [ $j -ge 3 ]; do j=$((j+1)); done");
        assert_eq!(value(&exec, "j").as_deref(), Some("3"));
    }

    #[test]
    fn break_and_continue_levels() {
        let mut exec = Executor::new();
        exec.run_source(
            "out=; for a in 1 2 3; do for b in x y; do \
             [ $a = 2 ] && continue 2; [ $a = 3 ] && break 2; out=$out$a$b; done; done",
        );
        assert_eq!(value(&exec, "out").as_deref(), Some("1x1y"));
        assert_eq!(exec.scope().depth(), 1);
    }

    #[test]
    fn for_iterates_positional_and_scopes_its_variable() {
        let mut exec = Executor::new();
        exec.set_positional(vec!["a b".into(), "c".into()]);
        exec.run_source("n=0; for arg; do n=$((n+1)); last=$arg; done");
        assert_eq!(value(&exec, "n").as_deref(), Some("2"));
        assert_eq!(value(&exec, "last").as_deref(), Some("c"));
        assert_eq!(value(&exec, "arg"), None);
    }

    #[test]
    fn case_patterns() {
        let mut exec = Executor::new();
        exec.run_source("case banana in [!a]*) r=neg;; *) r=other;; esac");
        assert_eq!(value(&exec, "r").as_deref(), Some("neg"));
        exec.run_source("case apple in [^a]*) r=neg;; [a-c]*) r=range;; esac");
        assert_eq!(value(&exec, "r").as_deref(), Some("range"));
        exec.run_source("case '*' in '*') r=literal;; esac");
        assert_eq!(value(&exec, "r").as_deref(), Some("literal"));
        exec.run_source("case x in y|x) r=alt;; esac");
        assert_eq!(value(&exec, "r").as_deref(), Some("alt"));
    }
}
