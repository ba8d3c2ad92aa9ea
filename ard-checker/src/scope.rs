// Lexical scope stack used during checking. Frames carry bindings and
// locally declared types; function frames are capture boundaries for
// closure analysis.

use crate::types::Type;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct VarInfo {
    pub ty: Type,
    pub mutable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Block,
    Loop,
    Function,
}

#[derive(Debug, Default)]
struct Frame {
    vars: HashMap<String, VarInfo>,
    types: HashMap<String, Type>,
    kind: Option<FrameKind>,
}

#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<Frame>,
    /// Active closure capture collectors, innermost last.
    captures: Vec<Vec<(String, Type)>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        let mut stack = Self::default();
        stack.push(FrameKind::Block);
        stack
    }

    pub fn push(&mut self, kind: FrameKind) {
        self.frames.push(Frame {
            kind: Some(kind),
            ..Frame::default()
        });
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn declare_var(&mut self, name: &str, ty: Type, mutable: bool) {
        if let Some(frame) = self.frames.last_mut() {
            frame.vars.insert(name.to_string(), VarInfo { ty, mutable });
        }
    }

    pub fn declare_type(&mut self, name: &str, ty: Type) {
        if let Some(frame) = self.frames.last_mut() {
            frame.types.insert(name.to_string(), ty);
        }
    }

    /// Look a binding up through the chain. When the lookup crosses a
    /// function boundary into an active closure, the name is recorded
    /// as a capture.
    pub fn lookup_var(&mut self, name: &str) -> Option<VarInfo> {
        let mut crossed_boundary = false;
        for frame in self.frames.iter().rev() {
            if let Some(info) = frame.vars.get(name) {
                if crossed_boundary {
                    if let Some(collector) = self.captures.last_mut() {
                        if !collector.iter().any(|(n, _)| n == name) {
                            collector.push((name.to_string(), info.ty.clone()));
                        }
                    }
                }
                return Some(info.clone());
            }
            if frame.kind == Some(FrameKind::Function) {
                crossed_boundary = true;
            }
        }
        None
    }

    pub fn lookup_type(&self, name: &str) -> Option<Type> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.types.get(name).cloned())
    }

    /// Names visible from the current frame, for suggestions.
    pub fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .frames
            .iter()
            .flat_map(|f| f.vars.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Inside a loop body, stopping at the nearest function boundary.
    pub fn in_loop(&self) -> bool {
        for frame in self.frames.iter().rev() {
            match frame.kind {
                Some(FrameKind::Loop) => return true,
                Some(FrameKind::Function) => return false,
                _ => {}
            }
        }
        false
    }

    pub fn begin_capture(&mut self) {
        self.captures.push(Vec::new());
    }

    pub fn end_capture(&mut self) -> Vec<(String, Type)> {
        self.captures.pop().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_the_chain() {
        let mut scopes = ScopeStack::new();
        scopes.declare_var("x", Type::Int, false);
        scopes.push(FrameKind::Block);
        assert!(scopes.lookup_var("x").is_some());
        assert!(scopes.lookup_var("y").is_none());
        scopes.pop();
    }

    #[test]
    fn loop_detection_stops_at_function_boundary() {
        let mut scopes = ScopeStack::new();
        scopes.push(FrameKind::Loop);
        assert!(scopes.in_loop());
        scopes.push(FrameKind::Function);
        assert!(!scopes.in_loop());
    }

    #[test]
    fn closure_captures_cross_boundary_names() {
        let mut scopes = ScopeStack::new();
        scopes.declare_var("outer", Type::Str, false);
        scopes.begin_capture();
        scopes.push(FrameKind::Function);
        scopes.declare_var("local", Type::Int, false);
        scopes.lookup_var("local");
        scopes.lookup_var("outer");
        scopes.pop();
        let captures = scopes.end_capture();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].0, "outer");
    }
}
