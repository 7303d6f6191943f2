use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// Languages accepted by the grading engine.
///
/// The set is fixed; a request naming anything else is rejected with
/// [`UnsupportedLanguageError`] before grading starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Language {
    Python,
    Cpp,
    CSharp,
    Java,
    JavaScript,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::Python,
        Language::Cpp,
        Language::CSharp,
        Language::Java,
        Language::JavaScript,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::Cpp => "C++",
            Language::CSharp => "C#",
            Language::Java => "Java",
            Language::JavaScript => "JavaScript",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported language: {0}")]
pub struct UnsupportedLanguageError(pub String);

impl FromStr for Language {
    type Err = UnsupportedLanguageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Python" => Ok(Language::Python),
            "C++" => Ok(Language::Cpp),
            "C#" => Ok(Language::CSharp),
            "Java" => Ok(Language::Java),
            "JavaScript" => Ok(Language::JavaScript),
            other => Err(UnsupportedLanguageError(other.to_string())),
        }
    }
}

impl TryFrom<String> for Language {
    type Error = UnsupportedLanguageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Commands and file conventions for one language.
///
/// Command templates are argument vectors, never shell strings; `%SOURCE%`
/// and `%STEM%` are substituted per submission with values derived from the
/// sanitized submitter token.  Submission content is never interpolated into
/// a command.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub name: &'static str,
    /// Source file extension, dot included.
    pub extension: &'static str,
    /// Compile command template; `None` for interpreted languages.
    pub compile: Option<Vec<String>>,
    /// Run command template.
    pub run: Vec<String>,
    /// Name template of the file the compile step must produce; doubles as
    /// the artifact to clean up afterwards.  The source file itself for
    /// interpreted languages.
    pub artifact: String,
    /// Whether the public entry-point class declaration must be renamed to
    /// the submission stem before the source is written (Java).
    pub renames_entry_point: bool,
}

impl Toolchain {
    pub fn source_name(&self, stem: &str) -> String {
        format!("{stem}{}", self.extension)
    }

    pub fn compile_command(&self, stem: &str) -> Option<Vec<String>> {
        self.compile
            .as_ref()
            .map(|template| substitute(template, stem, self.extension))
    }

    pub fn run_command(&self, stem: &str) -> Vec<String> {
        substitute(&self.run, stem, self.extension)
    }

    pub fn artifact_name(&self, stem: &str) -> String {
        substitute(std::slice::from_ref(&self.artifact), stem, self.extension).remove(0)
    }
}

/// Applies the placeholder mapping to every element of a command template.
fn substitute(template: &[String], stem: &str, extension: &str) -> Vec<String> {
    let source = format!("{stem}{extension}");
    let mut mapping = HashMap::<&str, &str>::new();
    mapping.insert("%SOURCE%", source.as_str());
    mapping.insert("%STEM%", stem);

    template
        .iter()
        .map(|s| {
            let mut t = s.clone();
            for (k, v) in mapping.iter() {
                t = t.replace(k, v);
            }
            t
        })
        .collect()
}

/// Immutable language-to-toolchain table, built once at startup.
///
/// Lookup is pure and total over [`Language`]; unknown identifiers cannot
/// reach it because they fail to parse into the enum.
pub struct LanguageRegistry {
    table: [Toolchain; 5],
}

impl LanguageRegistry {
    pub fn new() -> Self {
        let owned = |parts: &[&str]| -> Vec<String> { parts.iter().map(|s| s.to_string()).collect() };

        // Table order follows Language::ALL.
        let table = [
            Toolchain {
                name: "Python",
                extension: ".py",
                compile: None,
                run: owned(&["python3", "%SOURCE%"]),
                artifact: "%SOURCE%".to_string(),
                renames_entry_point: false,
            },
            Toolchain {
                name: "C++",
                extension: ".cpp",
                compile: Some(owned(&["g++", "%SOURCE%", "-o", "%STEM%.out"])),
                run: owned(&["./%STEM%.out"]),
                artifact: "%STEM%.out".to_string(),
                renames_entry_point: false,
            },
            Toolchain {
                name: "C#",
                extension: ".cs",
                compile: Some(owned(&["mcs", "-out:%STEM%.out", "%SOURCE%"])),
                run: owned(&["mono", "%STEM%.out"]),
                artifact: "%STEM%.out".to_string(),
                renames_entry_point: false,
            },
            Toolchain {
                name: "Java",
                extension: ".java",
                compile: Some(owned(&["javac", "%SOURCE%"])),
                run: owned(&["java", "%STEM%"]),
                artifact: "%STEM%.class".to_string(),
                renames_entry_point: true,
            },
            Toolchain {
                name: "JavaScript",
                extension: ".js",
                compile: None,
                run: owned(&["node", "%SOURCE%"]),
                artifact: "%SOURCE%".to_string(),
                renames_entry_point: false,
            },
        ];

        Self { table }
    }

    pub fn get(&self, language: Language) -> &Toolchain {
        &self.table[language as usize]
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
