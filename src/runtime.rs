//! The Rivet engine
//!
//! Holds the merged script tables, the sorted matching buffer, sessions,
//! and plug-ins. Life has two phases: a configuration phase (`load_*`,
//! definition setters, `sort_replies` — all `&mut self`) and a reply
//! phase (`reply` and runtime accessors — all `&self`). The borrow
//! checker enforces that no script loading can race a reply.

use crate::ast::Topic;
use crate::config::Config;
use crate::handlers::{ObjectHandler, Subroutine};
use crate::morpheme::Preprocessor;
use crate::parser::Parser;
use crate::session::{MemoryStore, SessionStore, ThawAction, UserData, UNDEFINED};
use crate::sorter::SortBuffer;
use crate::Result;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Extensions accepted by [`Rivet::load_directory`]
const SCRIPT_EXTENSIONS: [&str; 2] = ["rive", "rs"];

/// The reply-script engine
///
/// # Example
///
/// ```rust,ignore
/// use rivet::Rivet;
///
/// let mut bot = Rivet::new();
/// bot.load_directory("./scripts")?;
/// bot.sort_replies();
/// println!("{}", bot.reply("user", "hello bot")?);
/// ```
pub struct Rivet {
    /// Engine options
    pub(crate) config: Config,

    // Definition tables, merged from every loaded document. All but the
    // first two are frozen once sort_replies runs; bot variables and
    // globals stay mutable because reply tags can write them.
    pub(crate) global: RwLock<HashMap<String, String>>,
    pub(crate) vars: RwLock<HashMap<String, String>>,
    pub(crate) sub: HashMap<String, String>,
    pub(crate) person: HashMap<String, String>,
    pub(crate) array: HashMap<String, Vec<String>>,
    pub(crate) topics: HashMap<String, Topic>,

    // Object macros
    pub(crate) handlers: HashMap<String, Box<dyn ObjectHandler>>,
    pub(crate) objlangs: HashMap<String, String>,
    pub(crate) subroutines: HashMap<String, Subroutine>,

    /// The sorted matching buffer
    pub(crate) sorted: SortBuffer,

    /// Session storage backend
    pub(crate) sessions: Box<dyn SessionStore>,

    /// Morpheme analyzer plug-in
    pub(crate) preprocessor: Option<Box<dyn Preprocessor>>,

    /// Reply-selection randomness
    pub(crate) rng: Mutex<StdRng>,
}

impl Rivet {
    /// Create an engine with default options
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create an engine with custom options
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            global: RwLock::new(HashMap::new()),
            vars: RwLock::new(HashMap::new()),
            sub: HashMap::new(),
            person: HashMap::new(),
            array: HashMap::new(),
            topics: HashMap::new(),
            handlers: HashMap::new(),
            objlangs: HashMap::new(),
            subroutines: HashMap::new(),
            sorted: SortBuffer::default(),
            sessions: Box::new(MemoryStore::new()),
            preprocessor: None,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Use a custom session store
    pub fn with_session_store(mut self, store: Box<dyn SessionStore>) -> Self {
        self.sessions = store;
        self
    }

    /// Seed the reply-selection RNG (for deterministic tests)
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Register the morpheme analyzer used in separation mode
    pub fn set_preprocessor(&mut self, preprocessor: Box<dyn Preprocessor>) {
        self.preprocessor = Some(preprocessor);
    }

    /// Engine options
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ==================== Loading ====================

    /// Load a script from an array of source lines
    ///
    /// `label` names the document in diagnostics.
    pub fn load_lines(&mut self, label: &str, lines: &[&str]) -> Result<()> {
        debug!(label, count = lines.len(), "loading script lines");
        let parser = Parser::new(&self.config, self.preprocessor.as_deref());
        let ast = parser.parse(label, lines)?;
        self.merge(ast)
    }

    /// Load a script from a single string
    pub fn stream(&mut self, text: &str) -> Result<()> {
        let lines: Vec<&str> = text.lines().collect();
        self.load_lines("stream()", &lines)
    }

    /// Load one script file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let label = path.display().to_string();
        let lines: Vec<&str> = text.lines().collect();
        self.load_lines(&label, &lines)
    }

    /// Load every script file in a directory (non-recursive)
    pub fn load_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let mut files: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| SCRIPT_EXTENSIONS.contains(&ext))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        for file in files {
            self.load_file(&file)?;
        }
        Ok(())
    }

    /// Merge one parsed document into the engine tables
    fn merge(&mut self, ast: crate::ast::Root) -> Result<()> {
        for (name, value) in ast.begin.global {
            // A couple of globals configure the engine itself.
            if name == "depth" {
                match value.parse::<usize>() {
                    Ok(depth) if depth >= 1 => self.config.depth = depth,
                    _ => warn!("can't set global depth to '{}'", value),
                }
            } else {
                self.global.write().unwrap().insert(name, value);
            }
        }
        self.vars.write().unwrap().extend(ast.begin.var);
        self.sub.extend(ast.begin.sub);
        self.person.extend(ast.begin.person);
        self.array.extend(ast.begin.array);

        for (name, topic) in ast.topics {
            let dest = self.topics.entry(name).or_default();
            dest.triggers.extend(topic.triggers);
            dest.includes.extend(topic.includes);
            dest.inherits.extend(topic.inherits);
        }

        // Topics referenced by includes/inherits must exist, even if no
        // script ever defines them.
        let referenced: Vec<String> = self
            .topics
            .values()
            .flat_map(|topic| topic.includes.iter().chain(topic.inherits.iter()))
            .cloned()
            .collect();
        for name in referenced {
            self.topics.entry(name).or_default();
        }

        for object in ast.objects {
            match self.handlers.get_mut(&object.language) {
                Some(handler) => {
                    if let Err(err) = handler.load(&object.name, &object.code) {
                        warn!(
                            name = object.name.as_str(),
                            language = object.language.as_str(),
                            "object macro failed to load: {}",
                            err
                        );
                    } else {
                        self.objlangs.insert(object.name, object.language);
                    }
                }
                None => {
                    warn!(
                        name = object.name.as_str(),
                        language = object.language.as_str(),
                        "no handler registered for object macro language"
                    );
                }
            }
        }
        Ok(())
    }

    // ==================== Definitions ====================

    /// Set a global (`! global`); the value `"undefined"` deletes it
    pub fn set_global(&self, name: &str, value: &str) {
        if value == UNDEFINED {
            self.global.write().unwrap().remove(name);
        } else {
            self.global
                .write()
                .unwrap()
                .insert(name.to_string(), value.to_string());
        }
    }

    /// Read a global
    pub fn get_global(&self, name: &str) -> Option<String> {
        self.global.read().unwrap().get(name).cloned()
    }

    /// Set a bot variable (`! var`); the value `"undefined"` deletes it
    pub fn set_variable(&self, name: &str, value: &str) {
        if value == UNDEFINED {
            self.vars.write().unwrap().remove(name);
        } else {
            self.vars
                .write()
                .unwrap()
                .insert(name.to_string(), value.to_string());
        }
    }

    /// Read a bot variable
    pub fn get_variable(&self, name: &str) -> Option<String> {
        self.vars.read().unwrap().get(name).cloned()
    }

    /// Set a message substitution (`! sub`)
    pub fn set_substitution(&mut self, name: &str, value: &str) {
        if value == UNDEFINED {
            self.sub.remove(name);
        } else {
            self.sub.insert(name.to_string(), value.to_string());
        }
    }

    /// Read a message substitution
    pub fn get_substitution(&self, name: &str) -> Option<String> {
        self.sub.get(name).cloned()
    }

    /// Set a person substitution (`! person`)
    pub fn set_person(&mut self, name: &str, value: &str) {
        if value == UNDEFINED {
            self.person.remove(name);
        } else {
            self.person.insert(name.to_string(), value.to_string());
        }
    }

    /// Read a person substitution
    pub fn get_person(&self, name: &str) -> Option<String> {
        self.person.get(name).cloned()
    }

    // ==================== User variables ====================

    /// Set one user variable
    pub fn set_uservar(&self, username: &str, name: &str, value: &str) {
        self.sessions
            .set(username, name, Some(value.to_string()));
    }

    /// Merge a map of user variables
    pub fn set_uservars(&self, username: &str, vars: HashMap<String, String>) {
        self.sessions.set_many(username, vars);
    }

    /// Read one user variable
    pub fn get_uservar(&self, username: &str, name: &str) -> Option<String> {
        self.sessions.get(username, name)
    }

    /// Clone one user's session record
    pub fn get_uservars(&self, username: &str) -> Option<UserData> {
        self.sessions.get_user(username)
    }

    /// Clone every session record
    pub fn get_all_uservars(&self) -> HashMap<String, UserData> {
        self.sessions.get_all()
    }

    /// The pattern text of the user's last matched trigger
    pub fn last_match(&self, username: &str) -> Option<String> {
        self.sessions.last_match(username)
    }

    /// Snapshot a user's variables beside the live copy
    pub fn freeze_uservars(&self, username: &str) -> Result<()> {
        self.sessions.freeze(username)
    }

    /// Restore or discard a user's snapshot
    pub fn thaw_uservars(&self, username: &str, action: ThawAction) -> Result<()> {
        self.sessions.thaw(username, action)
    }

    /// Delete one user's session
    pub fn clear_uservars(&self, username: &str) {
        self.sessions.clear(username);
    }

    /// Delete every session
    pub fn clear_all_uservars(&self) {
        self.sessions.clear_all();
    }

    // ==================== Object macros ====================

    /// Register a language handler for object macros
    pub fn set_handler(&mut self, language: &str, handler: Box<dyn ObjectHandler>) {
        self.handlers.insert(language.to_string(), handler);
    }

    /// Remove a language handler
    pub fn remove_handler(&mut self, language: &str) {
        self.handlers.remove(language);
        self.objlangs.retain(|_, lang| lang != language);
    }

    /// Register a native subroutine; wins name collisions with macros
    pub fn set_subroutine<F>(&mut self, name: &str, subroutine: F)
    where
        F: Fn(&Rivet, &[String]) -> String + Send + Sync + 'static,
    {
        self.subroutines
            .insert(name.to_string(), Box::new(subroutine));
    }

    /// Remove a native subroutine
    pub fn delete_subroutine(&mut self, name: &str) {
        self.subroutines.remove(name);
    }

    // ==================== Introspection ====================

    /// Topic names and their sorted trigger patterns, for debugging
    pub fn dump_sorted(&self) -> Vec<(String, Vec<String>)> {
        let mut out: Vec<(String, Vec<String>)> = self
            .sorted
            .topics
            .iter()
            .map(|(topic, entries)| {
                (
                    topic.clone(),
                    entries.iter().map(|entry| entry.text.clone()).collect(),
                )
            })
            .collect();
        out.sort();
        out
    }

    /// Topic names and their raw trigger counts, for debugging
    pub fn dump_topics(&self) -> Vec<(String, usize)> {
        let mut out: Vec<(String, usize)> = self
            .topics
            .iter()
            .map(|(name, topic)| (name.clone(), topic.triggers.len()))
            .collect();
        out.sort();
        out
    }

    /// Uniform random index below `n`
    pub(crate) fn random_index(&self, n: usize) -> usize {
        self.rng.lock().unwrap().gen_range(0..n)
    }
}

impl Default for Rivet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_accessors() {
        let mut bot = Rivet::new();
        bot.set_variable("name", "Rivet");
        assert_eq!(bot.get_variable("name").as_deref(), Some("Rivet"));
        bot.set_variable("name", "undefined");
        assert_eq!(bot.get_variable("name"), None);

        bot.set_global("env", "test");
        assert_eq!(bot.get_global("env").as_deref(), Some("test"));

        bot.set_substitution("whats", "what is");
        assert_eq!(bot.get_substitution("whats").as_deref(), Some("what is"));

        bot.set_person("you", "i");
        assert_eq!(bot.get_person("you").as_deref(), Some("i"));
    }

    #[test]
    fn test_merge_referenced_topics_exist() {
        let mut bot = Rivet::new();
        bot.stream("> topic child inherits ghost\n+ hi\n- hello\n< topic")
            .unwrap();
        assert!(bot.topics.contains_key("ghost"));
    }

    #[test]
    fn test_global_depth_configures_engine() {
        let mut bot = Rivet::new();
        bot.stream("! global depth = 10").unwrap();
        assert_eq!(bot.config.depth, 10);
        bot.stream("! global depth = zero").unwrap();
        assert_eq!(bot.config.depth, 10);
    }

    #[test]
    fn test_load_file_and_directory() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.rive");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "+ hello bot").unwrap();
        writeln!(file, "- hello human").unwrap();

        // A file with a foreign extension is skipped by directory loads.
        std::fs::write(dir.path().join("notes.txt"), "not a script").unwrap();

        let mut bot = Rivet::new();
        bot.load_directory(dir.path()).unwrap();
        bot.sort_replies();
        assert_eq!(bot.reply("user", "hello bot").unwrap(), "hello human");
    }

    #[test]
    fn test_uservar_roundtrip() {
        let bot = Rivet::new();
        bot.set_uservar("alice", "age", "5");
        assert_eq!(bot.get_uservar("alice", "age").as_deref(), Some("5"));
        assert_eq!(bot.get_uservar("alice", "missing"), None);

        bot.clear_uservars("alice");
        assert!(bot.get_uservars("alice").is_none());
    }
}
