//! Keyword configuration: the phrase lists the router matches against.
//!
//! The file is a JSON object of `{category: [phrases]}`. Phrases are stored
//! lowercased and trimmed; categories absent from the file keep their
//! built-in lists. A [`KeywordStore`] holds the active [`KeywordSet`] behind
//! an `Arc` swap so readers never see a half-applied reload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, RwLock};
use std::time::SystemTime;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ChatError;

pub const GREETINGS: &str = "greetings";
pub const ACKNOWLEDGMENTS: &str = "acknowledgments";
pub const PAYPAL: &str = "paypal";
pub const PUBLICATIONS: &str = "publications";
pub const REMITTANCE: &str = "remittance";
pub const FEES: &str = "fees";
pub const ACADEMIC: &str = "academic";
pub const LMS_CMS: &str = "lms_cms";
pub const GREETING_PREFIXES: &str = "greeting_prefixes";
pub const SALUTATIONS: &str = "salutations";
pub const STUDENT_SPECIFIC: &str = "student_specific";
pub const UNIVERSITY: &str = "tau_university";

const DEFAULT_KEYWORDS: &[(&str, &[&str])] = &[
    (
        GREETINGS,
        &[
            "hi", "hello", "hey", "good morning", "good afternoon", "good evening",
            "good night", "greetings", "namaste", "hola", "bonjour", "salut",
        ],
    ),
    (
        ACKNOWLEDGMENTS,
        &[
            "thanks", "thank you", "thx", "ty", "thanku", "tnx", "noted",
            "noted with thanks", "okay", "ok", "okey", "okie", "okk", "k", "kk", "kay",
            "alright", "all right", "rite", "got it", "gotcha", "understood", "cool",
            "fine", "great", "awesome", "perfect", "sure", "confirmed", "confirm", "done",
            "completed", "yep", "yes", "yeah", "ya", "yah",
        ],
    ),
    (
        PAYPAL,
        &[
            "paypal", "pay pal", "paypal payment", "pay through paypal", "paypal option",
            "paypal link", "undertaking letter", "paypal account",
        ],
    ),
    (
        PUBLICATIONS,
        &[
            "publication", "article", "research paper", "journal", "publish", "manuscript",
            "paper submission", "research publication", "journal article", "publish paper",
            "research work", "e-journal",
        ],
    ),
    (
        REMITTANCE,
        &[
            "remittance", "payment proof", "receipt", "transaction", "payment receipt",
            "bank transfer", "payment confirmation", "proof of payment", "payment slip",
        ],
    ),
    (
        FEES,
        &[
            "fee", "fees", "payment", "invoice", "pay", "due", "balance", "amount", "bill",
            "tuition", "outstanding", "partial", "next installment", "fee structure",
        ],
    ),
    (
        ACADEMIC,
        &[
            "course", "grade", "mark", "enrollment", "subject", "program", "academic",
            "mentor", "block", "test", "exam", "status", "duration", "study material",
            "assignment",
        ],
    ),
    (
        LMS_CMS,
        &[
            "lms", "cms", "learning management", "course management", "portal", "login",
            "password", "access", "interface",
        ],
    ),
    (
        GREETING_PREFIXES,
        &[
            "hi", "hello", "hey", "good morning", "good afternoon", "good evening", "dear",
            "respected", "sir", "madam",
        ],
    ),
    (
        SALUTATIONS,
        &["sir", "madam", "ma'am", "mr", "mrs", "ms", "dr", "prof"],
    ),
    (
        STUDENT_SPECIFIC,
        &[
            "my fee", "my payment", "my invoice", "my balance", "my due", "my course",
            "my grade", "my marks", "my status", "my enrollment", "application number",
            "student id", "my account",
        ],
    ),
    (
        UNIVERSITY,
        &[
            "texila", "tau", "texila american university", "our university",
            "this university", "university details", "about tau", "about texila",
        ],
    ),
];

// =============================================================================
// KeywordConfig
// =============================================================================

/// Category name to phrase list, as stored in the keyword file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordConfig {
    categories: BTreeMap<String, Vec<String>>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        let categories = DEFAULT_KEYWORDS
            .iter()
            .map(|(name, phrases)| {
                (
                    name.to_string(),
                    normalize(phrases.iter().map(|p| p.to_string())),
                )
            })
            .collect();
        Self { categories }
    }
}

impl KeywordConfig {
    /// Parse a keyword file body. Missing categories are filled from the
    /// built-in lists.
    pub fn from_json(json: &str) -> Result<Self, ChatError> {
        let parsed: BTreeMap<String, Vec<String>> = serde_json::from_str(json)?;
        let mut config = Self::default();
        for (name, phrases) in parsed {
            config.categories.insert(name, normalize(phrases));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ChatError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        info!("Keywords loaded from {}", path.display());
        Ok(config)
    }

    /// Load from `path`, falling back to the built-in lists when the file is
    /// missing or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load keywords from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Write the configuration as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ChatError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Keywords saved to {}", path.display());
        Ok(())
    }

    /// Phrases for a category; empty for an unknown category.
    pub fn phrases(&self, category: &str) -> &[String] {
        self.categories
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Add phrases to a category, skipping ones already present. Returns the
    /// number actually added.
    pub fn add_phrases<I, S>(&mut self, category: &str, phrases: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list = self.categories.entry(category.to_string()).or_default();
        let mut added = 0;
        for phrase in phrases {
            let phrase = phrase.as_ref().trim().to_lowercase();
            if phrase.is_empty() || list.contains(&phrase) {
                continue;
            }
            list.push(phrase);
            added += 1;
        }
        added
    }
}

/// Lowercase, trim, drop empties and dedup while keeping first-seen order.
fn normalize<I>(phrases: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = Vec::new();
    for phrase in phrases {
        let phrase = phrase.trim().to_lowercase();
        if !phrase.is_empty() && !out.contains(&phrase) {
            out.push(phrase);
        }
    }
    out
}

// =============================================================================
// KeywordSet
// =============================================================================

/// A keyword configuration plus the patterns compiled from it.
#[derive(Debug)]
pub struct KeywordSet {
    config: KeywordConfig,
    prefix_re: Option<Regex>,
    salutation_re: Option<Regex>,
}

static DEFAULT_SET: LazyLock<Arc<KeywordSet>> = LazyLock::new(|| {
    Arc::new(KeywordSet::new(KeywordConfig::default()).expect("Invalid default keyword pattern"))
});

impl KeywordSet {
    pub fn new(config: KeywordConfig) -> Result<Self, ChatError> {
        let prefix_re = compile_prefix(config.phrases(GREETING_PREFIXES))?;
        let salutation_re = compile_salutation(config.phrases(SALUTATIONS))?;
        Ok(Self {
            config,
            prefix_re,
            salutation_re,
        })
    }

    /// Shared set built from the built-in lists.
    pub fn defaults() -> Arc<KeywordSet> {
        Arc::clone(&DEFAULT_SET)
    }

    pub fn config(&self) -> &KeywordConfig {
        &self.config
    }

    pub fn phrases(&self, category: &str) -> &[String] {
        self.config.phrases(category)
    }

    /// True when `lowered` contains any phrase of `category`. The caller
    /// passes text that is already lowercased.
    pub fn matches(&self, category: &str, lowered: &str) -> bool {
        self.config
            .phrases(category)
            .iter()
            .any(|p| lowered.contains(p.as_str()))
    }

    /// Leading greeting prefix pattern, if any prefixes are configured.
    pub fn prefix_pattern(&self) -> Option<&Regex> {
        self.prefix_re.as_ref()
    }

    /// Embedded honorific pattern, if any salutations are configured.
    pub fn salutation_pattern(&self) -> Option<&Regex> {
        self.salutation_re.as_ref()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Escaped alternation, longest phrase first so "good morning" wins over
/// "good". Word boundaries are only added next to word characters.
fn alternation(phrases: &[String], leading_boundary: bool) -> Option<String> {
    if phrases.is_empty() {
        return None;
    }
    let mut sorted: Vec<&String> = phrases.iter().collect();
    sorted.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));

    let alts: Vec<String> = sorted
        .into_iter()
        .map(|p| {
            let mut alt = String::new();
            if leading_boundary && p.chars().next().is_some_and(is_word_char) {
                alt.push_str(r"\b");
            }
            alt.push_str(&regex::escape(p));
            if p.chars().last().is_some_and(is_word_char) {
                alt.push_str(r"\b");
            }
            alt
        })
        .collect();
    Some(alts.join("|"))
}

fn compile_prefix(phrases: &[String]) -> Result<Option<Regex>, ChatError> {
    alternation(phrases, false)
        .map(|alts| Regex::new(&format!(r"(?i)^(?:{})\s*[,.]?\s*", alts)))
        .transpose()
        .map_err(|e| ChatError::Keywords(format!("Invalid greeting prefix pattern: {}", e)))
}

fn compile_salutation(phrases: &[String]) -> Result<Option<Regex>, ChatError> {
    alternation(phrases, true)
        .map(|alts| Regex::new(&format!(r"(?i)(?:{})[,.]?\s*", alts)))
        .transpose()
        .map_err(|e| ChatError::Keywords(format!("Invalid salutation pattern: {}", e)))
}

// =============================================================================
// KeywordStore
// =============================================================================

/// Hot-reloadable holder of the active [`KeywordSet`].
#[derive(Debug)]
pub struct KeywordStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<KeywordSet>>,
    loaded_mtime: Mutex<Option<SystemTime>>,
}

impl KeywordStore {
    /// Store with the built-in lists and no backing file.
    pub fn with_defaults() -> Self {
        Self {
            path: None,
            current: RwLock::new(KeywordSet::defaults()),
            loaded_mtime: Mutex::new(None),
        }
    }

    /// Store over an in-memory configuration with no backing file.
    pub fn from_config(config: KeywordConfig) -> Result<Self, ChatError> {
        Ok(Self {
            path: None,
            current: RwLock::new(Arc::new(KeywordSet::new(config)?)),
            loaded_mtime: Mutex::new(None),
        })
    }

    /// Store backed by a keyword file. A missing or malformed file yields the
    /// built-in lists; later `reload` calls pick the file up once it is fixed.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mtime = modified_time(&path);
        let set = KeywordConfig::load(&path)
            .and_then(KeywordSet::new)
            .map(Arc::new)
            .unwrap_or_else(|e| {
                warn!(
                    "Failed to load keywords from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                KeywordSet::defaults()
            });
        Self {
            path: Some(path),
            current: RwLock::new(set),
            loaded_mtime: Mutex::new(mtime),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The active set. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<KeywordSet> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Re-read the keyword file. On failure the active set is kept and the
    /// error returned.
    pub fn reload(&self) -> Result<(), ChatError> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| ChatError::Keywords("No keyword file configured".to_string()))?;
        let mtime = modified_time(path);
        let config = KeywordConfig::load(path)?;
        self.install(KeywordSet::new(config)?)?;
        self.set_mtime(mtime);
        info!("Keywords reloaded from {}", path.display());
        Ok(())
    }

    /// Reload only when the file's modification time changed since the last
    /// load. Returns whether a reload happened.
    pub fn reload_if_modified(&self) -> Result<bool, ChatError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(false);
        };
        let current = modified_time(path);
        let previous = *self
            .loaded_mtime
            .lock()
            .map_err(|e| ChatError::Keywords(format!("Lock poisoned: {}", e)))?;
        if current.is_none() || current == previous {
            return Ok(false);
        }
        debug!("Keyword file {} changed on disk", path.display());
        match self.reload() {
            Ok(()) => Ok(true),
            Err(e) => {
                // Remember the broken version so it is not retried every poll.
                self.set_mtime(current);
                Err(e)
            }
        }
    }

    /// Swap in a new configuration without touching the file.
    pub fn replace(&self, config: KeywordConfig) -> Result<(), ChatError> {
        self.install(KeywordSet::new(config)?)
    }

    /// Add phrases to a category, rebuild the set and persist it when a file
    /// is configured. Returns the number of phrases added.
    pub fn add_keywords<I, S>(&self, category: &str, phrases: I) -> Result<usize, ChatError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = self.snapshot().config().clone();
        let added = config.add_phrases(category, phrases);
        if added == 0 {
            return Ok(0);
        }
        self.install(KeywordSet::new(config)?)?;
        if self.path.is_some() {
            self.save()?;
        }
        info!(category, added, "Keywords added");
        Ok(added)
    }

    /// Persist the active configuration to the keyword file.
    pub fn save(&self) -> Result<(), ChatError> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| ChatError::Keywords("No keyword file configured".to_string()))?;
        self.snapshot().config().save(path)?;
        self.set_mtime(modified_time(path));
        Ok(())
    }

    fn install(&self, set: KeywordSet) -> Result<(), ChatError> {
        let mut guard = self
            .current
            .write()
            .map_err(|e| ChatError::Keywords(format!("Lock poisoned: {}", e)))?;
        *guard = Arc::new(set);
        Ok(())
    }

    fn set_mtime(&self, mtime: Option<SystemTime>) {
        if let Ok(mut guard) = self.loaded_mtime.lock() {
            *guard = mtime;
        }
    }
}

impl Default for KeywordStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
