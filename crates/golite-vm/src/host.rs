//! Host boundary: the shared error list and host-provided callbacks.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;

use crate::error::{Diagnostic, RuntimeError};

/// Name of the console callback `println` writes through.
pub const RAW_DISPLAY: &str = "display";

/// Host callback taking one line of text.
pub type Native = Box<dyn FnMut(&str)>;

pub struct HostContext {
    pub errors: Vec<Diagnostic>,
    natives: HashMap<String, Native>,
    captured: Option<Rc<RefCell<Vec<String>>>>,
}

impl HostContext {
    /// Context whose display writes to stdout.
    pub fn new() -> Self {
        Self::with_display(|line| println!("{}", line))
    }

    pub fn with_display(display: impl FnMut(&str) + 'static) -> Self {
        let mut host = Self { errors: Vec::new(), natives: HashMap::new(), captured: None };
        host.register(RAW_DISPLAY, display);
        host
    }

    /// Context that records displayed lines; read them with [`output`].
    ///
    /// [`output`]: HostContext::output
    pub fn capturing() -> Self {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&lines);
        let mut host = Self::with_display(move |line| sink.borrow_mut().push(line.to_string()));
        host.captured = Some(lines);
        host
    }

    pub fn register(&mut self, name: &str, native: impl FnMut(&str) + 'static) {
        self.natives.insert(name.to_string(), Box::new(native));
    }

    pub fn call_native(&mut self, name: &str, arg: &str) -> Result<(), RuntimeError> {
        let native = self
            .natives
            .get_mut(name)
            .ok_or_else(|| RuntimeError::Internal(format!("host provides no `{}` callback", name)))?;
        native(arg);
        Ok(())
    }

    /// Lines captured so far; empty unless built with [`HostContext::capturing`].
    pub fn output(&self) -> Vec<String> {
        self.captured.as_ref().map(|lines| lines.borrow().clone()).unwrap_or_default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.errors.push(diagnostic);
    }
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capturing_display() {
        let mut host = HostContext::capturing();
        host.call_native(RAW_DISPLAY, "hello").unwrap();
        host.call_native(RAW_DISPLAY, "world").unwrap();
        assert_eq!(host.output(), vec!["hello".to_string(), "world".to_string()]);
        assert!(host.call_native("missing", "x").is_err());
    }
}
