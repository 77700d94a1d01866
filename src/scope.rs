//! Variable scopes.
//!
//! A stack of frames searched innermost to outermost. Frame 0 is the global
//! frame and is never popped. Function calls, `for` loops and prefix
//! assignments (`NAME=v cmd`) each push one frame; the executor pairs every
//! push with a pop through `Executor::with_scope`.

use std::collections::{BTreeMap, HashMap};

use crate::error::{ShellError, ShellResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function,
    Loop,
    /// Bindings from `NAME=v cmd` for one builtin or function call.
    Command,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variable {
    pub value: String,
    pub exported: bool,
    pub readonly: bool,
    pub local: bool,
}

impl Variable {
    pub fn new(value: impl Into<String>) -> Self {
        Variable {
            value: value.into(),
            ..Variable::default()
        }
    }
}

#[derive(Debug, Clone)]
struct Frame {
    kind: ScopeKind,
    vars: HashMap<String, Variable>,
    positional: Option<Vec<String>>,
}

impl Frame {
    fn new(kind: ScopeKind, positional: Option<Vec<String>>) -> Self {
        Frame {
            kind,
            vars: HashMap::new(),
            positional,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

fn readonly_error(name: &str) -> ShellError {
    ShellError::execution(format!("{}: readonly variable", name))
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack {
            frames: vec![Frame::new(ScopeKind::Global, Some(Vec::new()))],
        }
    }

    /// Global frame seeded from the process environment, all exported.
    pub fn from_env() -> Self {
        let mut scopes = ScopeStack::new();
        for (name, value) in std::env::vars() {
            scopes.frames[0].vars.insert(
                name,
                Variable {
                    value,
                    exported: true,
                    ..Variable::default()
                },
            );
        }
        scopes
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push(&mut self, kind: ScopeKind, positional: Option<Vec<String>>) {
        self.frames.push(Frame::new(kind, positional));
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn in_function(&self) -> bool {
        self.frames
            .iter()
            .any(|frame| frame.kind == ScopeKind::Function)
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.frames.iter().rev().find_map(|frame| frame.vars.get(name))
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|var| var.value.as_str())
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.vars.get_mut(name))
    }

    /// Update the innermost existing binding, or create a global one.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> ShellResult<()> {
        let value = value.into();
        if let Some(var) = self.find_mut(name) {
            if var.readonly {
                return Err(readonly_error(name));
            }
            var.value = value;
            return Ok(());
        }
        self.frames[0].vars.insert(name.to_string(), Variable::new(value));
        Ok(())
    }

    /// Bind in the innermost frame regardless of outer bindings.
    pub fn bind_current(&mut self, name: &str, value: impl Into<String>, exported: bool) {
        if let Some(frame) = self.frames.last_mut() {
            frame.vars.insert(
                name.to_string(),
                Variable {
                    value: value.into(),
                    exported,
                    local: frame.kind != ScopeKind::Global,
                    readonly: false,
                },
            );
        }
    }

    /// `local name[=value]`: bind in the innermost function frame.
    pub fn set_local(&mut self, name: &str, value: Option<String>) -> ShellResult<()> {
        let Some(frame) = self
            .frames
            .iter_mut()
            .rev()
            .find(|frame| frame.kind == ScopeKind::Function)
        else {
            return Err(ShellError::execution("local: can only be used in a function"));
        };
        match frame.vars.get_mut(name) {
            Some(var) if var.readonly => return Err(readonly_error(name)),
            Some(var) => {
                if let Some(value) = value {
                    var.value = value;
                }
            }
            None => {
                frame.vars.insert(
                    name.to_string(),
                    Variable {
                        value: value.unwrap_or_default(),
                        local: true,
                        ..Variable::default()
                    },
                );
            }
        }
        Ok(())
    }

    pub fn export(&mut self, name: &str, value: Option<String>) -> ShellResult<()> {
        if let Some(value) = value {
            self.set(name, value)?;
        } else if self.get(name).is_none() {
            self.set(name, "")?;
        }
        if let Some(var) = self.find_mut(name) {
            var.exported = true;
        }
        Ok(())
    }

    pub fn set_readonly(&mut self, name: &str, value: Option<String>) -> ShellResult<()> {
        if let Some(value) = value {
            self.set(name, value)?;
        } else if self.get(name).is_none() {
            self.set(name, "")?;
        }
        if let Some(var) = self.find_mut(name) {
            var.readonly = true;
        }
        Ok(())
    }

    /// Remove the innermost binding of `name`.
    pub fn unset(&mut self, name: &str) -> ShellResult<()> {
        for frame in self.frames.iter_mut().rev() {
            if let Some(var) = frame.vars.get(name) {
                if var.readonly {
                    return Err(readonly_error(name));
                }
                frame.vars.remove(name);
                return Ok(());
            }
        }
        Ok(())
    }

    /// Every visible binding; inner frames shadow outer ones.
    pub fn visible(&self) -> BTreeMap<&str, &Variable> {
        let mut all = BTreeMap::new();
        for frame in &self.frames {
            for (name, var) in &frame.vars {
                all.insert(name.as_str(), var);
            }
        }
        all
    }

    /// Environment for spawned processes.
    pub fn exported(&self) -> Vec<(String, String)> {
        self.visible()
            .into_iter()
            .filter(|(_, var)| var.exported)
            .map(|(name, var)| (name.to_string(), var.value.clone()))
            .collect()
    }

    pub fn positional(&self) -> &[String] {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.positional.as_deref())
            .unwrap_or(&[])
    }

    fn positional_mut(&mut self) -> Option<&mut Vec<String>> {
        self.frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.positional.as_mut())
    }

    pub fn set_positional(&mut self, args: Vec<String>) {
        if let Some(positional) = self.positional_mut() {
            *positional = args;
        }
    }

    /// Drop the first `n` positional parameters; false when fewer exist.
    pub fn shift(&mut self, n: usize) -> bool {
        match self.positional_mut() {
            Some(positional) if positional.len() >= n => {
                positional.drain(..n);
                true
            }
            _ => false,
        }
    }
}
