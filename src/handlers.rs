//! Object-macro handlers and native subroutines
//!
//! Scripts can define `> object NAME LANG` blocks whose bodies run in a
//! foreign language. The engine does not ship any language runtime; it
//! dispatches to an [`ObjectHandler`] registered for `LANG`. Native Rust
//! macros register as [`Subroutine`]s and win name collisions.

use crate::runtime::Rivet;

/// A language runtime for object macros
///
/// One handler serves every macro of its language. `load` is called once
/// per macro at parse time with the verbatim body lines; `call` runs at
/// reply time. A `call` error is logged and the macro evaluates to an
/// empty string.
pub trait ObjectHandler: Send + Sync {
    /// Compile or store a macro body
    fn load(&mut self, name: &str, code: &[String]) -> crate::Result<()>;

    /// Invoke a macro by name
    fn call(&self, rivet: &Rivet, name: &str, args: &[String]) -> crate::Result<String>;
}

/// A native Rust object macro
///
/// Receives the engine (for [`Rivet::current_user`] and variable access)
/// and the parsed `<call>` arguments.
pub type Subroutine = Box<dyn Fn(&Rivet, &[String]) -> String + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct EchoHandler {
        loaded: HashMap<String, Vec<String>>,
    }

    impl ObjectHandler for EchoHandler {
        fn load(&mut self, name: &str, code: &[String]) -> crate::Result<()> {
            self.loaded.insert(name.to_string(), code.to_vec());
            Ok(())
        }

        fn call(&self, _rivet: &Rivet, name: &str, args: &[String]) -> crate::Result<String> {
            Ok(format!("{}:{}", name, args.join(",")))
        }
    }

    #[test]
    fn test_handler_load_and_call() {
        let mut handler = EchoHandler {
            loaded: HashMap::new(),
        };
        handler
            .load("greet", &["return 'hi'".to_string()])
            .unwrap();
        assert!(handler.loaded.contains_key("greet"));

        let bot = Rivet::new();
        let out = handler
            .call(&bot, "greet", &["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(out, "greet:a,b");
    }
}
