//! Response parser — recovers structured build artifacts from one AI
//! text blob.
//!
//! Models emit files in several competing conventions (tagged blocks,
//! annotated fences, "Generated Files" listings, comment-annotated
//! fences), often truncated mid-stream. Each convention is handled by an
//! independent extractor; all candidates are merged by a deterministic
//! dedup rule so the surviving content for a path does not depend on
//! extractor order or block position.

use regex::Regex;
use serde::{Deserialize, Serialize};

// =============================================================================
// TYPES
// =============================================================================

/// One recovered file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFile {
    pub path: String,
    pub content: String,
    /// False when the block was truncated (no closing tag/fence).
    pub is_complete: bool,
}

/// Everything recovered from one model response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedArtifacts {
    /// Unique by path, ordered by first appearance in the text.
    pub files: Vec<ParsedFile>,
    /// Insertion-ordered, deduplicated.
    pub packages: Vec<String>,
    /// Shell commands in emission order, never deduplicated.
    pub commands: Vec<String>,
    pub structure: Option<String>,
    pub explanation: Option<String>,
}

impl ParsedArtifacts {
    pub fn file(&self, path: &str) -> Option<&ParsedFile> {
        self.files.iter().find(|f| f.path == path)
    }
}

/// A candidate produced by one extractor, before dedup.
#[derive(Debug, Clone)]
struct FileCandidate {
    path: String,
    content: String,
    is_complete: bool,
}

impl FileCandidate {
    /// True when the content carries an ellipsis that is not a spread or
    /// rest pattern — usually the model eliding a section it never wrote.
    fn has_suspect_ellipsis(&self) -> bool {
        let re = Regex::new(r"\.\.\.(\s|$)").unwrap();
        re.is_match(&self.content)
    }

    /// Dedup rank: closed beats truncated, clean beats ellipsis-suspect,
    /// longer beats shorter. Content is the final tie-break so the result
    /// is independent of block order in the raw text.
    fn rank(&self) -> (bool, bool, usize) {
        (self.is_complete, !self.has_suspect_ellipsis(), self.content.len())
    }

    fn beats(&self, other: &FileCandidate) -> bool {
        let (a, b) = (self.rank(), other.rank());
        if a != b {
            return a > b;
        }
        self.content < other.content
    }
}

// =============================================================================
// PARSER
// =============================================================================

/// Parse one raw model response into structured artifacts.
pub fn parse_response(text: &str) -> ParsedArtifacts {
    let mut candidates = Vec::new();
    candidates.extend(extract_tagged_blocks(text));
    candidates.extend(extract_annotated_fences(text));
    candidates.extend(extract_generated_files_listing(text));
    candidates.extend(extract_comment_annotated_fences(text));

    let files = merge_candidates(candidates);

    let mut packages = infer_packages_from_imports(&files);
    for pkg in extract_package_tags(text) {
        if !packages.contains(&pkg) {
            packages.push(pkg);
        }
    }

    ParsedArtifacts {
        commands: extract_commands(text),
        structure: extract_single_tag(text, "structure"),
        explanation: extract_single_tag(text, "explanation"),
        files,
        packages,
    }
}

/// Fold candidates into a unique-by-path list. First appearance fixes the
/// position; a later, better candidate replaces content in place.
fn merge_candidates(candidates: Vec<FileCandidate>) -> Vec<ParsedFile> {
    let mut merged: Vec<FileCandidate> = Vec::new();
    for cand in candidates {
        match merged.iter_mut().find(|c| c.path == cand.path) {
            Some(existing) => {
                if cand.beats(existing) {
                    *existing = cand;
                }
            }
            None => merged.push(cand),
        }
    }
    merged
        .into_iter()
        .map(|c| ParsedFile {
            path: c.path,
            content: c.content,
            is_complete: c.is_complete,
        })
        .collect()
}

// =============================================================================
// EXTRACTORS
// =============================================================================

/// `<file path="...">...</file>` blocks. A block runs from its opening
/// tag to the next `</file>`, the next `<file path=` opener, or end of
/// text — whichever comes first. Missing closers mark truncation.
fn extract_tagged_blocks(text: &str) -> Vec<FileCandidate> {
    let open_re = Regex::new(r#"<file\s+path="([^"]+)"\s*>"#).unwrap();
    let opens: Vec<(usize, usize, String)> = open_re
        .captures_iter(text)
        .map(|cap| {
            let m = cap.get(0).unwrap();
            (m.start(), m.end(), cap[1].to_string())
        })
        .collect();

    let mut out = Vec::new();
    for (i, (_, body_start, path)) in opens.iter().enumerate() {
        let next_open = opens
            .get(i + 1)
            .map(|(start, _, _)| *start)
            .unwrap_or(text.len());
        let close = text[*body_start..next_open]
            .find("</file>")
            .map(|rel| *body_start + rel);

        let (body_end, is_complete) = match close {
            Some(pos) => (pos, true),
            None => (next_open, false),
        };
        out.push(FileCandidate {
            path: path.clone(),
            content: text[*body_start..body_end].trim_matches('\n').to_string(),
            is_complete,
        });
    }
    out
}

/// Fenced code blocks whose fence line carries `path="..."`.
fn extract_annotated_fences(text: &str) -> Vec<FileCandidate> {
    let fence_re = Regex::new(r#"(?m)^```[^\n]*path="([^"]+)"[^\n]*\n"#).unwrap();
    let mut out = Vec::new();
    for cap in fence_re.captures_iter(text) {
        let m = cap.get(0).unwrap();
        let body_start = m.end();
        let (body_end, is_complete) = match text[body_start..].find("\n```") {
            Some(rel) => (body_start + rel, true),
            None => (text.len(), false),
        };
        out.push(FileCandidate {
            path: cap[1].to_string(),
            content: text[body_start..body_end].trim_matches('\n').to_string(),
            is_complete,
        });
    }
    out
}

/// "Generated Files: a.jsx, b.css" plain-text listing, followed by a
/// best-effort grab of the first fenced block after each name's next
/// mention.
fn extract_generated_files_listing(text: &str) -> Vec<FileCandidate> {
    let line_re = Regex::new(r"(?mi)^Generated Files?:\s*(.+)$").unwrap();
    let Some(cap) = line_re.captures(text) else {
        return Vec::new();
    };
    let listing_end = cap.get(0).unwrap().end();

    let mut out = Vec::new();
    for name in cap[1].split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some(mention) = text[listing_end..].find(name).map(|rel| listing_end + rel) else {
            continue;
        };
        let Some(fence_start) = text[mention..].find("```").map(|rel| mention + rel) else {
            continue;
        };
        let Some(body_start) = text[fence_start..]
            .find('\n')
            .map(|rel| fence_start + rel + 1)
        else {
            continue;
        };
        let (body_end, is_complete) = match text[body_start..].find("\n```") {
            Some(rel) => (body_start + rel, true),
            None => (text.len(), false),
        };
        out.push(FileCandidate {
            path: name.to_string(),
            content: text[body_start..body_end].trim_matches('\n').to_string(),
            is_complete,
        });
    }
    out
}

/// Bare fenced blocks whose first line names the file in a `// File:` or
/// `// Component:` comment. A bare component name is placed under the
/// conventional components directory.
fn extract_comment_annotated_fences(text: &str) -> Vec<FileCandidate> {
    let block_re = Regex::new(r"(?ms)^```[a-zA-Z]*\n(.*?)\n```").unwrap();
    let header_re = Regex::new(r"^//\s*(File|Component):\s*(\S+)").unwrap();

    let mut out = Vec::new();
    for cap in block_re.captures_iter(text) {
        let body = &cap[1];
        let first_line = body.lines().next().unwrap_or("");
        let Some(header) = header_re.captures(first_line) else {
            continue;
        };
        let name = header[2].to_string();
        let path = if &header[1] == "Component" && !name.contains('/') && !name.contains('.') {
            format!("src/components/{}.jsx", name)
        } else {
            name
        };
        let content = body
            .lines()
            .skip(1)
            .collect::<Vec<_>>()
            .join("\n")
            .trim_matches('\n')
            .to_string();
        out.push(FileCandidate {
            path,
            content,
            is_complete: true,
        });
    }
    out
}

// =============================================================================
// PACKAGES / COMMANDS / FREE TEXT
// =============================================================================

/// Scan accepted file contents for third-party import specifiers.
/// Relative specifiers and `node:` builtins are skipped; scoped packages
/// keep `@scope/name`, everything else takes the first path segment.
fn infer_packages_from_imports(files: &[ParsedFile]) -> Vec<String> {
    let import_re = Regex::new(
        r#"(?m)(?:^\s*import\s+(?:[^'";]*?\bfrom\s+)?|\brequire\(\s*|\bimport\(\s*)['"]([^'"]+)['"]"#,
    )
    .unwrap();

    let mut packages = Vec::new();
    for file in files {
        for cap in import_re.captures_iter(&file.content) {
            let spec = &cap[1];
            if spec.starts_with('.') || spec.starts_with('/') || spec.starts_with("node:") {
                continue;
            }
            let pkg = package_name_of(spec);
            if !packages.contains(&pkg) {
                packages.push(pkg);
            }
        }
    }
    packages
}

fn package_name_of(specifier: &str) -> String {
    let mut segments = specifier.split('/');
    let first = segments.next().unwrap_or(specifier);
    if first.starts_with('@') {
        match segments.next() {
            Some(second) => format!("{}/{}", first, second),
            None => first.to_string(),
        }
    } else {
        first.to_string()
    }
}

/// `<package>` and `<packages>` tags; the plural form splits on
/// whitespace and commas.
fn extract_package_tags(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let single_re = Regex::new(r"(?s)<package>(.*?)</package>").unwrap();
    for cap in single_re.captures_iter(text) {
        let name = cap[1].trim().to_string();
        if !name.is_empty() && !out.contains(&name) {
            out.push(name);
        }
    }
    let plural_re = Regex::new(r"(?s)<packages>(.*?)</packages>").unwrap();
    for cap in plural_re.captures_iter(text) {
        for name in cap[1].split(|c: char| c.is_whitespace() || c == ',') {
            let name = name.trim().to_string();
            if !name.is_empty() && !out.contains(&name) {
                out.push(name);
            }
        }
    }
    out
}

fn extract_commands(text: &str) -> Vec<String> {
    let re = Regex::new(r"(?s)<command>(.*?)</command>").unwrap();
    re.captures_iter(text)
        .map(|cap| cap[1].trim().to_string())
        .filter(|cmd| !cmd.is_empty())
        .collect()
}

fn extract_single_tag(text: &str, tag: &str) -> Option<String> {
    let re = Regex::new(&format!(r"(?s)<{tag}>(.*?)</{tag}>")).unwrap();
    re.captures(text).map(|cap| cap[1].trim().to_string())
}

// =============================================================================
// TESTS
// =============================================================================
