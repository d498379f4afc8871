use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

// One source policy enforced at build time. `keep` decides whether a line the
// pattern matched is a real violation.
struct Rule {
    title: &'static str,
    pattern: &'static str,
    checks_build_script: bool,
    keep: fn(&str) -> bool,
    advice: &'static str,
}

const FORBIDDEN_WORDS: [&str; 14] = [
    "FIXED",
    "CORRECTED",
    "FIX",
    "FIXES",
    "NEW",
    "CHANGED",
    "CHANGES",
    "CHANGE",
    "MODIFIED",
    "MODIFIES",
    "MODIFY",
    "UPDATED",
    "UPDATES",
    "UPDATE",
];

const RULES: [Rule; 5] = [
    Rule {
        title: "underscore-prefixed identifiers",
        pattern: r"\b(_[a-zA-Z0-9_]+)\b",
        checks_build_script: true,
        keep: is_code_identifier,
        advice: "Either use the binding (dropping the underscore) or remove it completely.",
    },
    Rule {
        title: "#[allow(dead_code)] attributes",
        pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        checks_build_script: false,
        keep: always,
        advice: "Either use the code or delete it.",
    },
    Rule {
        title: "comments with forbidden revision words",
        pattern: r"(//|/\*).*(?:FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE)",
        checks_build_script: false,
        keep: always,
        advice: "Comments describe the code as it is, not its history. Remove the comment.",
    },
    Rule {
        title: "'**' in regular comments",
        pattern: r"(//|/\*).*\*\*",
        checks_build_script: false,
        keep: is_stars_violation,
        advice: "Emphasis markers are only allowed in /// doc comments.",
    },
    Rule {
        title: "comments written entirely in uppercase",
        pattern: r"(//|/\*).*",
        checks_build_script: false,
        keep: is_shouting_comment,
        advice: "Strongly consider deleting the comment completely.",
    },
];

struct RuleCollector<'a> {
    rule: &'a Rule,
    hits: Vec<String>,
}

impl Sink for RuleCollector<'_> {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if (self.rule.keep)(line_text) {
            self.hits.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn always(_: &str) -> bool {
    true
}

fn is_comment_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("//") || trimmed.starts_with("/*")
}

fn is_doc_comment(line: &str) -> bool {
    line.trim_start().starts_with("///")
}

// Lines that are comments, or whose underscore sits inside a string literal, are skipped.
fn is_code_identifier(line: &str) -> bool {
    if is_comment_line(line) {
        return false;
    }
    let quoted_underscore = line
        .split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'));
    !quoted_underscore
}

fn is_stars_violation(line: &str) -> bool {
    let has_forbidden_word = FORBIDDEN_WORDS.iter().any(|word| line.contains(word));
    !is_doc_comment(line) || has_forbidden_word
}

fn comment_body(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("///") {
        return Some(rest.trim());
    }
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Some(rest.trim());
    }
    let start = line.find("/*")? + 2;
    let body = &line[start..];
    Some(match body.find("*/") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    })
}

fn is_shouting_comment(line: &str) -> bool {
    let Some(body) = comment_body(line) else {
        return false;
    };
    let mut letters = body.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(char::is_uppercase)
}

// The retrieval pack under ./examples is third-party code and is not held to this policy.
fn source_files() -> Vec<PathBuf> {
    WalkDir::new(".")
        .into_iter()
        .filter_entry(|e| {
            let path = e.path();
            !path.starts_with("./target") && !path.starts_with("./examples")
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn check_rule(rule: &Rule, files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(rule.pattern)?;
    let mut searcher = Searcher::new();

    for path in files {
        if !rule.checks_build_script && path.file_name().is_some_and(|name| name == "build.rs") {
            continue;
        }
        let mut collector = RuleCollector {
            rule,
            hits: Vec::new(),
        };
        searcher.search_path(&matcher, path, &mut collector)?;
        if !collector.hits.is_empty() {
            return Err(format_violation(rule, path, &collector.hits).into());
        }
    }
    Ok(())
}

fn format_violation(rule: &Rule, path: &Path, hits: &[String]) -> String {
    let mut message = format!(
        "\n❌ ERROR: Found {} {} in {}:\n",
        hits.len(),
        rule.title,
        path.display()
    );
    for hit in hits {
        message.push_str(&format!("   {hit}\n"));
    }
    message.push_str(&format!(
        "\n⚠️ {} are STRICTLY FORBIDDEN in this project.\n   {}\n",
        rule.title, rule.advice
    ));
    message
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in ["clock", "cli", "tests", "benches"] {
        println!("cargo:rerun-if-changed={dir}");
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=BEARCLOCK_BUILD_TIMESTAMP={timestamp}");

    let files = source_files();
    for rule in &RULES {
        if let Err(e) = check_rule(rule, &files) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
