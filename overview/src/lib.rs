//! Project overview documents: a fixed five-section plain-text template that engineers edit by
//! hand and that this crate parses, mutates and regenerates.
//!
//! The document layer only ever sees a path plus in-memory project data. Catalog access and
//! filesystem inventory live behind `storage` / `workspace` so front ends can wire them up.

pub mod core {
    use crate::section::SectionKind;
    use chrono::NaiveDate;
    use indexmap::IndexMap;
    use serde::{Deserialize, Serialize};
    use std::path::PathBuf;

    /* ------------------------------ Catalog records ------------------------------ */

    /// One project revision as recorded in the catalog.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ProjectMeta {
        pub id: i64,
        pub number: String,
        pub name: String,
        pub revision: u32,
        pub created: NaiveDate,
        #[serde(default = "ProjectMeta::default_status")]
        pub status: String,
        #[serde(default)]
        pub issues: String,
        /// Applications (tools) this revision has folders for.
        #[serde(default)]
        pub app_ids: Vec<i64>,
        /// Linked datasheets, relative to the datasheets directory or absolute.
        #[serde(default)]
        pub datasheets: Vec<String>,
    }

    impl ProjectMeta {
        fn default_status() -> String {
            "Planning".to_string()
        }

        /// `<number>_<name>_Rev<revision>`, also the per-app folder name.
        pub fn display_name(&self) -> String {
            format!("{}_{}_Rev{}", self.number, self.name, self.revision)
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AppInfo {
        pub id: i64,
        pub name: String,
        #[serde(default)]
        pub is_default: bool,
    }

    /* ------------------------------ Document values ------------------------------ */

    /// A checkbox line inside the TODO section.
    ///
    /// `line_number` indexes the raw line array of the file as it was when parsed. Any write to
    /// the file invalidates it, so re-parse before every mutation and never keep items around.
    #[serde_with::skip_serializing_none]
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TodoItem {
        pub line_number: usize,
        pub is_completed: bool,
        pub timestamp: Option<String>,
        pub description: String,
        pub raw_line: String,
    }

    impl TodoItem {
        pub fn marker(&self) -> &'static str {
            if self.is_completed { "[x]" } else { "[ ]" }
        }

        /// Text after the marker: `[timestamp] description`, or just the description.
        pub fn body(&self) -> String {
            match &self.timestamp {
                Some(ts) => format!("[{ts}] {}", self.description),
                None => self.description.clone(),
            }
        }
    }

    /// Contents of one application folder for the Description listing.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub enum AppFolder {
        NotCreated,
        Files(Vec<String>),
    }

    /// Freshly computed Files-by-Application and Datasheets data.
    #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct DescriptionListing {
        /// App name → folder state, in catalog order.
        pub apps: IndexMap<String, AppFolder>,
        /// Datasheet file names.
        pub datasheets: Vec<String>,
    }

    /// Free-text bodies carried across a regeneration.
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct Preserved {
        pub notes: String,
        pub todo: String,
        pub status_history: String,
    }

    /// Result of a line-addressed mutation. A stale handle is not an error.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Outcome {
        Applied,
        Unchanged,
    }

    /* ---------------------------- Errors (document) ---------------------------- */

    #[derive(Debug, thiserror::Error)]
    pub enum OverviewError {
        #[error("could not find the {section} section in {path:?}")]
        SectionNotFound { section: &'static str, path: PathBuf },
        #[error("invalid input: {0}")]
        InvalidInput(String),
        #[error("i/o error on {path:?}: {source}")]
        Io {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
        #[error("could not replace {path:?}: {source}")]
        Persist {
            path: PathBuf,
            #[source]
            source: tempfile::PersistError,
        },
    }

    impl OverviewError {
        pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
            Self::Io {
                path: path.into(),
                source,
            }
        }

        pub fn section_not_found(kind: SectionKind, path: impl Into<PathBuf>) -> Self {
            Self::SectionNotFound {
                section: kind.title(),
                path: path.into(),
            }
        }
    }

    pub type Result<T> = std::result::Result<T, OverviewError>;
}

pub mod section {
    //! The five canonical sections and the rules that frame them.
    //!
    //! A section heading is three lines: rule, title, rule. Major sections (Header, Todo) use
    //! `=` rules, minor ones (Description, Notes, Status History) use `-` rules.

    pub const MAJOR_RULE: &str =
        "==============================================================================";
    pub const MINOR_RULE: &str =
        "------------------------------------------------------------------------------";

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Delimiter {
        Major,
        Minor,
    }

    impl Delimiter {
        pub fn rule(self) -> &'static str {
            match self {
                Delimiter::Major => MAJOR_RULE,
                Delimiter::Minor => MINOR_RULE,
            }
        }

        /// Any line whose trimmed text starts with three `=` or `-` counts; hand-edited rules
        /// drift in length.
        pub fn classify(line: &str) -> Option<Self> {
            let t = line.trim();
            if t.starts_with("===") {
                Some(Delimiter::Major)
            } else if t.starts_with("---") {
                Some(Delimiter::Minor)
            } else {
                None
            }
        }
    }

    /// Template order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub enum SectionKind {
        Header,
        Description,
        Notes,
        Todo,
        StatusHistory,
    }

    impl SectionKind {
        pub const ALL: [SectionKind; 5] = [
            SectionKind::Header,
            SectionKind::Description,
            SectionKind::Notes,
            SectionKind::Todo,
            SectionKind::StatusHistory,
        ];

        pub fn title(self) -> &'static str {
            match self {
                SectionKind::Header => "PROJECT OVERVIEW",
                SectionKind::Description => "DESCRIPTION",
                SectionKind::Notes => "NOTES",
                SectionKind::Todo => "TODO",
                SectionKind::StatusHistory => "STATUS HISTORY",
            }
        }

        pub fn delimiter(self) -> Delimiter {
            match self {
                SectionKind::Header | SectionKind::Todo => Delimiter::Major,
                _ => Delimiter::Minor,
            }
        }

        pub fn from_title(line: &str) -> Option<Self> {
            let t = line.trim();
            Self::ALL.into_iter().find(|kind| kind.title() == t)
        }

        /// Whether a rule of kind `delim` inside this section's body closes the body early.
        /// The Description body carries its own short dashed sub-rules, so it only ends at the
        /// next heading. Free-text sections keep dashed underlines typed by hand.
        pub fn ends_at(self, delim: Delimiter) -> bool {
            match self {
                SectionKind::Header | SectionKind::Description => false,
                SectionKind::Todo => true,
                SectionKind::Notes | SectionKind::StatusHistory => delim == Delimiter::Major,
            }
        }

        /// The literal three heading lines as written by the template.
        pub fn heading(self) -> [&'static str; 3] {
            let rule = self.delimiter().rule();
            [rule, self.title(), rule]
        }
    }

}

pub mod text {
    //! Whole-file line view shared by every write path.
    //!
    //! Line endings follow one policy: a document containing any `\r\n` is treated as CRLF,
    //! anything else as LF. Lines are split on either and written back with the detected ending.

    use crate::core::{OverviewError, Result};
    use std::{fs, io::Write, path::Path};
    use tempfile::NamedTempFile;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum LineEnding {
        #[default]
        Lf,
        CrLf,
    }

    impl LineEnding {
        pub fn detect(text: &str) -> Self {
            if text.contains("\r\n") {
                LineEnding::CrLf
            } else {
                LineEnding::Lf
            }
        }

        pub fn as_str(self) -> &'static str {
            match self {
                LineEnding::Lf => "\n",
                LineEnding::CrLf => "\r\n",
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct LineBuffer {
        pub lines: Vec<String>,
        pub ending: LineEnding,
        pub trailing_newline: bool,
    }

    impl LineBuffer {
        pub fn from_text(text: &str) -> Self {
            Self {
                lines: text.lines().map(str::to_string).collect(),
                ending: LineEnding::detect(text),
                trailing_newline: text.ends_with('\n'),
            }
        }

        pub fn to_text(&self) -> String {
            let sep = self.ending.as_str();
            let mut out = self.lines.join(sep);
            if self.trailing_newline && !self.lines.is_empty() {
                out.push_str(sep);
            }
            out
        }

        pub fn read(path: &Path) -> Result<Self> {
            let text = fs::read_to_string(path).map_err(|source| OverviewError::io(path, source))?;
            Ok(Self::from_text(&text))
        }

        pub fn write(&self, path: &Path) -> Result<()> {
            write_atomic(path, &self.to_text())
        }
    }

    /// Replace `path` with `contents` via a sibling temp file and a rename, so an interrupted
    /// write never leaves a truncated document behind.
    pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(|source| OverviewError::io(dir, source))?;
        tmp.write_all(contents.as_bytes())
            .map_err(|source| OverviewError::io(path, source))?;
        tmp.persist(path).map_err(|source| OverviewError::Persist {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    pub fn ensure_parent_dir(path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| OverviewError::io(dir, source))?;
        }
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn round_trips_lf_crlf_and_missing_final_newline() {
            for text in ["a\nb\n", "a\r\nb\r\n", "a\nb", "\n", "", "a\n\n"] {
                assert_eq!(LineBuffer::from_text(text).to_text(), text, "{text:?}");
            }
        }

        #[test]
        fn mixed_endings_normalise_to_crlf() {
            let buffer = LineBuffer::from_text("a\r\nb\nc\n");
            assert_eq!(buffer.ending, LineEnding::CrLf);
            assert_eq!(buffer.lines, vec!["a", "b", "c"]);
            assert_eq!(buffer.to_text(), "a\r\nb\r\nc\r\n");
        }

        #[test]
        fn write_atomic_replaces_existing_file() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("doc.txt");
            fs::write(&path, "old contents that are longer\n").expect("seed");
            write_atomic(&path, "new\n").expect("write");
            assert_eq!(fs::read_to_string(&path).expect("read"), "new\n");
            let leftovers = fs::read_dir(tmp.path()).expect("ls").count();
            assert_eq!(leftovers, 1);
        }
    }
}

pub mod codec {
    //! Single-line encodings: TODO checkbox lines and status-history entries.

    use crate::core::TodoItem;
    use chrono::NaiveDateTime;
    use nom::{
        IResult,
        branch::alt,
        bytes::complete::{tag, take_until},
        character::complete::char,
        combinator::value,
        sequence::delimited,
    };

    pub const TODO_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";
    pub const STATUS_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    const MARKERS: [&str; 3] = ["[ ]", "[x]", "[X]"];

    type PResult<'a, T> = IResult<&'a str, T>;

    fn checkbox(i: &str) -> PResult<'_, bool> {
        alt((
            value(false, tag("[ ]")),
            value(true, tag("[x]")),
            value(true, tag("[X]")),
        ))(i)
    }

    /// `[text]` up to the first `]`; the text may be empty.
    fn bracketed(i: &str) -> PResult<'_, &str> {
        delimited(char('['), take_until("]"), char(']'))(i)
    }

    /// Completion state when the left-trimmed line opens with a checkbox marker.
    pub fn todo_marker(line: &str) -> Option<bool> {
        checkbox(line.trim_start()).ok().map(|(_, done)| done)
    }

    /// Decode a checkbox line. A missing or unclosed timestamp bracket is not an error: the whole
    /// remainder becomes the description.
    pub fn parse_todo_line(raw: &str, line_number: usize) -> Option<TodoItem> {
        let (rest, is_completed) = checkbox(raw.trim_start()).ok()?;
        let rest = rest.trim_start();
        let (timestamp, description) = match bracketed(rest) {
            Ok((after, ts)) => (Some(ts.to_string()), after.trim_start().to_string()),
            Err(_) => (None, rest.to_string()),
        };
        Some(TodoItem {
            line_number,
            is_completed,
            timestamp,
            description,
            raw_line: raw.to_string(),
        })
    }

    pub fn encode_todo_line(is_completed: bool, timestamp: Option<&str>, description: &str) -> String {
        let marker = if is_completed { "[x]" } else { "[ ]" };
        match timestamp {
            Some(ts) => format!("{marker} [{ts}] {description}"),
            None => format!("{marker} {description}"),
        }
    }

    pub fn encode_item(item: &TodoItem) -> String {
        encode_todo_line(item.is_completed, item.timestamp.as_deref(), &item.description)
    }

    pub fn new_todo_line(description: &str, now: NaiveDateTime) -> String {
        let stamp = now.format(TODO_TIMESTAMP_FORMAT).to_string();
        encode_todo_line(false, Some(&stamp), description)
    }

    pub fn status_entry(old: Option<&str>, new: &str, at: NaiveDateTime) -> String {
        let old = old.filter(|s| !s.trim().is_empty()).unwrap_or("None");
        format!(
            "[{}] Status changed: {old} -> {new}",
            at.format(STATUS_TIMESTAMP_FORMAT)
        )
    }

    /// Flip the earliest checkbox marker in `line`; `None` when there is none.
    pub fn toggle_marker(line: &str) -> Option<String> {
        let (pos, found) = MARKERS
            .iter()
            .filter_map(|m| line.find(m).map(|p| (p, *m)))
            .min_by_key(|(p, _)| *p)?;
        let replacement = if found == "[ ]" { "[x]" } else { "[ ]" };
        let mut out = String::with_capacity(line.len());
        out.push_str(&line[..pos]);
        out.push_str(replacement);
        out.push_str(&line[pos + found.len()..]);
        Some(out)
    }

}

pub mod parser {
    //! Forgiving scanners over document text.
    //!
    //! - `parse_todo_section` is a three-state machine (`None → FoundHeader → InSection`) with no
    //!   backtracking; anything it does not recognise is skipped, never rejected.
    //! - `Outline` locates section headings and body ranges for the writers.

    use crate::codec::parse_todo_line;
    use crate::core::{Preserved, TodoItem};
    use crate::section::{Delimiter, SectionKind};
    use std::ops::Range;
    use tracing::debug;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum ScanState {
        None,
        FoundHeader,
        InSection,
    }

    /// Items of the TODO section. A document without a `TODO` header yields nothing.
    pub fn parse_todo_section(text: &str) -> Vec<TodoItem> {
        let lines: Vec<&str> = text.lines().collect();
        parse_todo_lines(&lines)
    }

    pub fn parse_todo_lines<S: AsRef<str>>(lines: &[S]) -> Vec<TodoItem> {
        let mut state = ScanState::None;
        let mut items = Vec::new();
        for (idx, raw) in lines.iter().enumerate() {
            let raw = raw.as_ref();
            // A stray `TODO` line earlier in the file must not hide the real heading.
            if raw.trim() == SectionKind::Todo.title() {
                state = ScanState::FoundHeader;
                continue;
            }
            match state {
                ScanState::None => {}
                ScanState::FoundHeader => {
                    if Delimiter::classify(raw) == Some(Delimiter::Major) {
                        state = ScanState::InSection;
                    }
                }
                ScanState::InSection => {
                    if Delimiter::classify(raw).is_some() {
                        break;
                    }
                    if let Some(item) = parse_todo_line(raw, idx) {
                        items.push(item);
                    }
                }
            }
        }
        debug!(items = items.len(), "scanned TODO section");
        items
    }

    /* ------------------------------- Outline ------------------------------- */

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SectionSpan {
        pub kind: SectionKind,
        /// Line index of the opening rule.
        pub opening: usize,
        /// Line index of the closing rule.
        pub closing: usize,
        /// Body lines, exclusive of any terminating rule.
        pub body: Range<usize>,
    }

    /// Section headings found in a document, in file order. Missing sections are simply absent.
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct Outline {
        pub sections: Vec<SectionSpan>,
    }

    impl Outline {
        pub fn scan<S: AsRef<str>>(lines: &[S]) -> Self {
            let mut headings = Vec::new();
            let mut idx = 0;
            while idx + 2 < lines.len() {
                if let Some(kind) = heading_at(lines, idx) {
                    headings.push((kind, idx));
                    idx += 3;
                } else {
                    idx += 1;
                }
            }

            let sections = headings
                .iter()
                .enumerate()
                .map(|(n, &(kind, opening))| {
                    let closing = opening + 2;
                    let limit = headings
                        .get(n + 1)
                        .map(|&(_, next)| next)
                        .unwrap_or(lines.len());
                    let end = (closing + 1..limit)
                        .find(|&i| {
                            Delimiter::classify(lines[i].as_ref()).is_some_and(|d| kind.ends_at(d))
                        })
                        .unwrap_or(limit);
                    SectionSpan {
                        kind,
                        opening,
                        closing,
                        body: closing + 1..end,
                    }
                })
                .collect();
            Self { sections }
        }

        /// First section of `kind`.
        pub fn find(&self, kind: SectionKind) -> Option<&SectionSpan> {
            self.sections.iter().find(|s| s.kind == kind)
        }

        /// Trimmed body text of the first `kind` section, empty when the section is missing.
        pub fn body_text<S: AsRef<str>>(&self, lines: &[S], kind: SectionKind) -> String {
            self.find(kind)
                .map(|span| {
                    lines[span.body.clone()]
                        .iter()
                        .map(|line| line.as_ref())
                        .collect::<Vec<&str>>()
                        .join("\n")
                        .trim()
                        .to_string()
                })
                .unwrap_or_default()
        }
    }

    fn heading_at<S: AsRef<str>>(lines: &[S], idx: usize) -> Option<SectionKind> {
        let kind = SectionKind::from_title(lines[idx + 1].as_ref())?;
        let delim = Some(kind.delimiter());
        (Delimiter::classify(lines[idx].as_ref()) == delim
            && Delimiter::classify(lines[idx + 2].as_ref()) == delim)
            .then_some(kind)
    }

    pub fn section_body(text: &str, kind: SectionKind) -> String {
        let lines: Vec<&str> = text.lines().collect();
        Outline::scan(&lines).body_text(&lines, kind)
    }

    /// Notes, TODO and Status History bodies to carry into a regenerated document.
    pub fn extract_preserved<S: AsRef<str>>(lines: &[S]) -> Preserved {
        let outline = Outline::scan(lines);
        Preserved {
            notes: outline.body_text(lines, SectionKind::Notes),
            todo: outline.body_text(lines, SectionKind::Todo),
            status_history: outline.body_text(lines, SectionKind::StatusHistory),
        }
    }

}

pub mod format {
    use crate::core::{AppFolder, DescriptionListing, Preserved, ProjectMeta};
    use crate::section::SectionKind;
    use std::fmt::Write;

    /// Full document text. Always LF; callers re-emit another ending through `LineBuffer`.
    pub fn render_overview(
        meta: &ProjectMeta,
        listing: &DescriptionListing,
        preserved: &Preserved,
    ) -> String {
        let mut out = String::new();
        push_heading(&mut out, SectionKind::Header);
        let _ = writeln!(out, "Project Number: {}", meta.number);
        let _ = writeln!(out, "Project Name:   {}", meta.name);
        let _ = writeln!(out, "Revision:       {}", meta.revision);
        let _ = writeln!(out, "Created:        {}", meta.created.format("%Y-%m-%d"));
        let _ = writeln!(out, "Status:         {}", meta.status);
        out.push('\n');

        push_heading(&mut out, SectionKind::Description);
        out.push_str(&render_description(listing));

        push_heading(&mut out, SectionKind::Notes);
        push_body(&mut out, &preserved.notes);
        push_heading(&mut out, SectionKind::Todo);
        push_body(&mut out, &preserved.todo);
        push_heading(&mut out, SectionKind::StatusHistory);
        push_body(&mut out, &preserved.status_history);
        out
    }

    /// Body of the Description section: Files by Application, then Datasheets.
    pub fn render_description(listing: &DescriptionListing) -> String {
        let mut out = String::from("\nFILES BY APPLICATION\n--------------------\n");
        for (app, folder) in &listing.apps {
            let _ = writeln!(out, "\n{app}:");
            match folder {
                AppFolder::NotCreated => out.push_str("  (Folder not created)\n"),
                AppFolder::Files(files) if files.is_empty() => out.push_str("  (No files)\n"),
                AppFolder::Files(files) => {
                    for file in files {
                        let _ = writeln!(out, "  - {file}");
                    }
                }
            }
        }

        out.push_str("\nDATASHEETS\n----------\n");
        if listing.datasheets.is_empty() {
            out.push_str("  (No datasheets linked)\n");
        } else {
            for sheet in &listing.datasheets {
                let _ = writeln!(out, "  - {sheet}");
            }
        }
        out.push('\n');
        out
    }

    fn push_heading(out: &mut String, kind: SectionKind) {
        for line in kind.heading() {
            out.push_str(line);
            out.push('\n');
        }
    }

    fn push_body(out: &mut String, body: &str) {
        let body = body.trim();
        if !body.is_empty() {
            out.push_str(body);
            out.push('\n');
        }
        out.push('\n');
    }

    /// Greedy word wrap for the printable digest.
    ///
    /// The first line may use `max_width` characters, continuation lines `max_width` minus the
    /// indent. An indent as wide as `max_width` is cut so one character still fits, and a zero
    /// width counts as one. Breaks land on the last space at or before the boundary, or
    /// mid-word when there is none. Lines are joined with `\n`, without a trailing newline.
    pub fn wrap_line(line: &str, max_width: usize, continuation_indent: &str) -> String {
        let max_width = max_width.max(1);
        let indent: String = continuation_indent.chars().take(max_width - 1).collect();
        let indent_width = indent.chars().count();
        let chars: Vec<char> = line.chars().collect();
        let mut out: Vec<String> = Vec::new();
        let mut pos = 0;
        let mut first = true;

        while pos < chars.len() {
            let (available, prefix) = if first {
                (max_width, "")
            } else {
                (max_width - indent_width, indent.as_str())
            };
            let remaining = &chars[pos..];
            if remaining.len() <= available {
                out.push(format!("{prefix}{}", remaining.iter().collect::<String>()));
                break;
            }

            let search_end = available.min(remaining.len() - 1);
            let break_at = match remaining[..=search_end].iter().rposition(|c| *c == ' ') {
                Some(p) if p > 0 => p,
                _ => available,
            };
            let segment: String = remaining[..break_at].iter().collect();
            out.push(format!("{prefix}{}", segment.trim_end()));

            pos += break_at;
            while pos < chars.len() && chars[pos] == ' ' {
                pos += 1;
            }
            first = false;
        }

        out.join("\n")
    }

}

pub mod storage {
    use crate::core::{AppInfo, ProjectMeta};
    use anyhow::Result;

    /// Project records and the app registry. The document layer never sees this; front ends
    /// resolve what they need and pass plain values down.
    pub trait ProjectCatalog {
        /// Projects ordered by number, then revision, both descending.
        fn projects(&self) -> Result<Vec<ProjectMeta>>;

        fn apps(&self) -> Result<Vec<AppInfo>>;

        fn set_status(&mut self, project_id: i64, status: &str) -> Result<()>;
    }
}

pub mod workspace {
    //! On-disk layout under the engineering root and the read-only inventory that feeds the
    //! Description listing.
    //!
    //! ```text
    //! <root>/<App>/<display>/...                       per-application project folders
    //! <root>/Documents/<display>/<display>_Overview.txt
    //! <root>/DATASHEETS/                              unless configured elsewhere
    //! <root>/OutstandingTodos.txt
    //! ```

    use crate::core::{AppFolder, AppInfo, DescriptionListing, ProjectMeta};
    use indexmap::IndexMap;
    use std::path::{Path, PathBuf};
    use tracing::warn;
    use walkdir::WalkDir;

    pub const DOCUMENTS_DIR: &str = "Documents";
    pub const DATASHEETS_DIR: &str = "DATASHEETS";
    pub const DIGEST_FILE: &str = "OutstandingTodos.txt";

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Layout {
        pub root: PathBuf,
        pub datasheets: PathBuf,
    }

    impl Layout {
        pub fn new(root: impl Into<PathBuf>, datasheets: Option<PathBuf>) -> Self {
            let root = root.into();
            let datasheets = datasheets.unwrap_or_else(|| root.join(DATASHEETS_DIR));
            Self { root, datasheets }
        }

        pub fn overview_path(&self, project: &ProjectMeta) -> PathBuf {
            let display = project.display_name();
            self.root
                .join(DOCUMENTS_DIR)
                .join(&display)
                .join(format!("{display}_Overview.txt"))
        }

        pub fn app_folder(&self, app: &AppInfo, project: &ProjectMeta) -> PathBuf {
            self.root.join(&app.name).join(project.display_name())
        }

        pub fn datasheet_path(&self, link: &str) -> PathBuf {
            let path = Path::new(link);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                self.datasheets.join(path)
            }
        }

        pub fn digest_path(&self) -> PathBuf {
            self.root.join(DIGEST_FILE)
        }
    }

    /// Files by application (catalog order, files sorted) plus linked datasheet names.
    pub fn inventory(layout: &Layout, project: &ProjectMeta, apps: &[AppInfo]) -> DescriptionListing {
        let mut listing = IndexMap::new();
        for app in apps.iter().filter(|a| project.app_ids.contains(&a.id)) {
            let folder = layout.app_folder(app, project);
            listing.insert(app.name.clone(), scan_app_folder(&folder));
        }
        let datasheets = project
            .datasheets
            .iter()
            .map(|link| {
                Path::new(link)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| link.clone())
            })
            .collect();
        DescriptionListing {
            apps: listing,
            datasheets,
        }
    }

    fn scan_app_folder(dir: &Path) -> AppFolder {
        if !dir.is_dir() {
            return AppFolder::NotCreated;
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    files.push(entry.file_name().to_string_lossy().into_owned());
                }
                Ok(_) => {}
                Err(err) => warn!(dir = %dir.display(), "skipping unreadable entry: {err}"),
            }
        }
        AppFolder::Files(files)
    }

}

pub mod catalog {
    //! TOML-backed `ProjectCatalog` plus engineering-root settings.

    use crate::core::{AppInfo, ProjectMeta};
    use crate::storage::ProjectCatalog;
    use crate::text::{ensure_parent_dir, write_atomic};
    use crate::workspace::Layout;
    use anyhow::{Context, Result, anyhow, bail};
    use serde::{Deserialize, Serialize};
    use std::{
        collections::BTreeSet,
        fs,
        path::{Path, PathBuf},
    };
    use tracing::warn;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Settings {
        pub engineering_root: PathBuf,
        /// Defaults to `<engineering_root>/DATASHEETS`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub datasheets_dir: Option<PathBuf>,
    }

    impl Settings {
        pub fn layout(&self) -> Layout {
            Layout::new(self.engineering_root.clone(), self.datasheets_dir.clone())
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CatalogFile {
        pub settings: Settings,
        #[serde(default)]
        pub apps: Vec<AppInfo>,
        #[serde(default)]
        pub projects: Vec<ProjectMeta>,
    }

    #[derive(Debug, Clone)]
    pub struct TomlCatalog {
        path: Option<PathBuf>,
        pub file: CatalogFile,
    }

    impl TomlCatalog {
        pub fn load(path: &Path) -> Result<Self> {
            let text = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
            let mut catalog =
                Self::parse_str(&text).with_context(|| format!("parsing catalog {:?}", path))?;
            catalog.path = Some(path.to_path_buf());
            Ok(catalog)
        }

        pub fn parse_str(text: &str) -> Result<Self> {
            let file: CatalogFile = toml::from_str(text)?;
            let mut seen = BTreeSet::new();
            for project in &file.projects {
                if !seen.insert(project.id) {
                    bail!("duplicate project id {} in catalog", project.id);
                }
                for app_id in &project.app_ids {
                    if !file.apps.iter().any(|a| a.id == *app_id) {
                        warn!(project = %project.display_name(), app_id, "project references an unknown app");
                    }
                }
            }
            Ok(Self { path: None, file })
        }

        pub fn save(&self) -> Result<()> {
            let path = self
                .path
                .as_deref()
                .context("catalog was not loaded from a file")?;
            let text = toml::to_string_pretty(&self.file).context("serialising catalog")?;
            ensure_parent_dir(path)?;
            write_atomic(path, &text)?;
            Ok(())
        }

        pub fn settings(&self) -> &Settings {
            &self.file.settings
        }
    }

    impl ProjectCatalog for TomlCatalog {
        fn projects(&self) -> Result<Vec<ProjectMeta>> {
            let mut projects = self.file.projects.clone();
            projects.sort_by(|a, b| {
                b.number
                    .cmp(&a.number)
                    .then_with(|| b.revision.cmp(&a.revision))
            });
            Ok(projects)
        }

        fn apps(&self) -> Result<Vec<AppInfo>> {
            Ok(self.file.apps.clone())
        }

        fn set_status(&mut self, project_id: i64, status: &str) -> Result<()> {
            let project = self
                .file
                .projects
                .iter_mut()
                .find(|p| p.id == project_id)
                .with_context(|| format!("no project with id {project_id}"))?;
            project.status = status.to_string();
            Ok(())
        }
    }

    /// Match a display name exactly, otherwise a project number (highest revision wins).
    pub fn select_project(projects: &[ProjectMeta], selector: &str) -> Result<ProjectMeta> {
        if let Some(project) = projects.iter().find(|p| p.display_name() == selector) {
            return Ok(project.clone());
        }
        projects
            .iter()
            .filter(|p| p.number == selector)
            .max_by_key(|p| p.revision)
            .cloned()
            .ok_or_else(|| anyhow!("no project matches {selector:?}"))
    }

    pub fn default_catalog_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "overview")
            .map(|dirs| dirs.config_dir().join("catalog.toml"))
    }

}

pub mod writer {
    //! Whole-document writers: lazy creation, regeneration with preserved free text, targeted
    //! Description refresh, and status-history entries.

    use crate::codec::status_entry;
    use crate::core::{DescriptionListing, OverviewError, Preserved, ProjectMeta, Result};
    use crate::format::{render_description, render_overview};
    use crate::parser::{Outline, extract_preserved};
    use crate::section::SectionKind;
    use crate::text::{LineBuffer, LineEnding, ensure_parent_dir, write_atomic};
    use chrono::{Local, NaiveDateTime};
    use std::path::Path;
    use tracing::{debug, info};

    /// Write the template if `path` does not exist yet. Returns whether a file was created.
    pub fn ensure_exists(
        path: &Path,
        meta: &ProjectMeta,
        listing: &DescriptionListing,
    ) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        ensure_parent_dir(path)?;
        write_atomic(path, &render_overview(meta, listing, &Preserved::default()))?;
        info!(path = %path.display(), "created overview document");
        Ok(true)
    }

    /// Rebuild the document from current data, carrying Notes, TODO and Status History bodies
    /// over from the existing file (if any). The old file is replaced in one rename.
    pub fn regenerate(path: &Path, meta: &ProjectMeta, listing: &DescriptionListing) -> Result<()> {
        let (preserved, ending) = if path.exists() {
            let old = LineBuffer::read(path)?;
            (extract_preserved(&old.lines), old.ending)
        } else {
            (Preserved::default(), LineEnding::default())
        };
        debug!(
            notes = preserved.notes.len(),
            todo = preserved.todo.len(),
            history = preserved.status_history.len(),
            "preserving sections"
        );

        ensure_parent_dir(path)?;
        let mut fresh = LineBuffer::from_text(&render_overview(meta, listing, &preserved));
        fresh.ending = ending;
        fresh.write(path)?;
        info!(path = %path.display(), "regenerated overview document");
        Ok(())
    }

    /// Replace only the lines between the Description heading and the Notes heading.
    pub fn refresh_files_and_datasheets(path: &Path, listing: &DescriptionListing) -> Result<()> {
        let mut buffer = LineBuffer::read(path)?;
        let outline = Outline::scan(&buffer.lines);
        let description = outline
            .find(SectionKind::Description)
            .ok_or_else(|| OverviewError::section_not_found(SectionKind::Description, path))?;
        let notes = outline
            .find(SectionKind::Notes)
            .filter(|notes| notes.opening > description.closing)
            .ok_or_else(|| OverviewError::section_not_found(SectionKind::Notes, path))?;

        let replacement: Vec<String> = render_description(listing)
            .lines()
            .map(str::to_string)
            .collect();
        buffer
            .lines
            .splice(description.closing + 1..notes.opening, replacement);
        buffer.write(path)?;
        info!(path = %path.display(), "refreshed files and datasheets");
        Ok(())
    }

    pub fn record_status_change(path: &Path, old: Option<&str>, new: &str) -> Result<()> {
        record_status_change_at(path, old, new, Local::now().naive_local())
    }

    /// Newest entries go directly under the Status History heading. A document that lost the
    /// section gets a fresh one appended.
    pub fn record_status_change_at(
        path: &Path,
        old: Option<&str>,
        new: &str,
        at: NaiveDateTime,
    ) -> Result<()> {
        let mut buffer = LineBuffer::read(path)?;
        let entry = status_entry(old, new, at);
        let closing = Outline::scan(&buffer.lines)
            .find(SectionKind::StatusHistory)
            .map(|span| span.closing);
        match closing {
            Some(closing) => buffer.lines.insert(closing + 1, entry),
            None => {
                if buffer.lines.last().is_some_and(|l| !l.trim().is_empty()) {
                    buffer.lines.push(String::new());
                }
                buffer
                    .lines
                    .extend(SectionKind::StatusHistory.heading().map(String::from));
                buffer.lines.push(entry);
                buffer.trailing_newline = true;
            }
        }
        buffer.write(path)?;
        info!(path = %path.display(), new, "recorded status change");
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::core::AppFolder;
        use crate::mutate::append_todo_at;
        use crate::parser::parse_todo_section;
        use chrono::NaiveDate;
        use indexmap::IndexMap;
        use std::fs;

        fn meta() -> ProjectMeta {
            ProjectMeta {
                id: 1,
                number: "24017".into(),
                name: "PumpController".into(),
                revision: 2,
                created: NaiveDate::from_ymd_opt(2024, 3, 5).expect("date"),
                status: "Active".into(),
                issues: String::new(),
                app_ids: vec![1],
                datasheets: vec![],
            }
        }

        fn listing(files: &[&str]) -> DescriptionListing {
            let mut apps = IndexMap::new();
            apps.insert(
                "Altium".to_string(),
                AppFolder::Files(files.iter().map(|f| f.to_string()).collect()),
            );
            DescriptionListing {
                apps,
                datasheets: vec![],
            }
        }

        fn at(day: u32) -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2024, 4, day)
                .and_then(|d| d.and_hms_opt(8, 30, 0))
                .expect("datetime")
        }

        fn read(path: &Path) -> String {
            fs::read_to_string(path).expect("read overview")
        }

        #[test]
        fn ensure_exists_creates_once() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("Documents").join("p").join("p_Overview.txt");

            assert!(ensure_exists(&path, &meta(), &listing(&[])).expect("create"));
            let first = read(&path);
            assert!(first.contains("TODO\n"));

            let mut other = meta();
            other.status = "Complete".into();
            assert!(!ensure_exists(&path, &other, &listing(&["x"])).expect("second call"));
            assert_eq!(read(&path), first);
        }

        #[test]
        fn regenerate_keeps_todos_history_and_notes() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("doc.txt");
            ensure_exists(&path, &meta(), &listing(&["old.SchDoc"])).expect("create");
            append_todo_at(&path, "Fix connector", at(1)).expect("append");
            append_todo_at(&path, "Order parts", at(2)).expect("append");
            record_status_change_at(&path, Some("Planning"), "Active", at(3)).expect("status");

            let edited = read(&path).replace(
                "NOTES\n------------------------------------------------------------------------------\n",
                "NOTES\n------------------------------------------------------------------------------\nUse the 2A fuse.\n",
            );
            fs::write(&path, edited).expect("hand edit");
            let before = parse_todo_section(&read(&path));

            regenerate(&path, &meta(), &listing(&["new.SchDoc", "new.PcbDoc"])).expect("regenerate");
            let text = read(&path);
            let after = parse_todo_section(&text);

            let describe = |items: &[crate::core::TodoItem]| -> Vec<String> {
                items.iter().map(|i| i.raw_line.clone()).collect()
            };
            assert_eq!(describe(&after), describe(&before));
            assert!(text.contains("  - new.PcbDoc\n"));
            assert!(!text.contains("old.SchDoc"));
            assert!(text.contains("Use the 2A fuse.\n"));
            assert!(text.contains("[2024-04-03 08:30:00] Status changed: Planning -> Active\n"));
        }

        #[test]
        fn regenerate_keeps_hand_typed_underlines_in_notes() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("doc.txt");
            ensure_exists(&path, &meta(), &listing(&["a"])).expect("create");
            let edited = read(&path).replace(
                "NOTES\n------------------------------------------------------------------------------\n",
                "NOTES\n------------------------------------------------------------------------------\nPower budget\n----------\nRail A 3.3V\nRail B 5V\n",
            );
            fs::write(&path, edited).expect("hand edit");

            regenerate(&path, &meta(), &listing(&["b"])).expect("regenerate");
            let text = read(&path);
            assert!(text.contains("Power budget\n----------\nRail A 3.3V\nRail B 5V\n\n"));
            assert!(parse_todo_section(&text).is_empty());
        }

        #[test]
        fn regenerate_is_idempotent() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("doc.txt");
            ensure_exists(&path, &meta(), &listing(&["a"])).expect("create");
            append_todo_at(&path, "one", at(1)).expect("append");

            regenerate(&path, &meta(), &listing(&["a"])).expect("first");
            let once = read(&path);
            regenerate(&path, &meta(), &listing(&["a"])).expect("second");
            assert_eq!(read(&path), once);
        }

        #[test]
        fn regenerate_without_a_file_writes_the_template() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("nested").join("doc.txt");
            regenerate(&path, &meta(), &listing(&[])).expect("regenerate");
            let fresh = render_overview(&meta(), &listing(&[]), &Preserved::default());
            assert_eq!(read(&path), fresh);
        }

        #[test]
        fn regenerate_keeps_crlf() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("doc.txt");
            let crlf = render_overview(&meta(), &listing(&[]), &Preserved::default())
                .replace('\n', "\r\n");
            fs::write(&path, crlf).expect("seed");
            regenerate(&path, &meta(), &listing(&["b"])).expect("regenerate");
            let text = read(&path);
            assert!(text.contains("  - b\r\n"));
            assert!(!text.replace("\r\n", "").contains('\n'));
        }

        #[test]
        fn refresh_only_touches_the_description_body() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("doc.txt");
            ensure_exists(&path, &meta(), &listing(&["a"])).expect("create");
            append_todo_at(&path, "keep me", at(1)).expect("append");

            let before = read(&path);
            refresh_files_and_datasheets(&path, &listing(&["a"])).expect("same listing");
            assert_eq!(read(&path), before);

            refresh_files_and_datasheets(&path, &listing(&["a", "b"])).expect("refresh");
            let after = read(&path);
            let head_before = &before[..before.find("FILES BY").expect("files")];
            let head_after = &after[..after.find("FILES BY").expect("files")];
            assert_eq!(head_before, head_after);
            let notes_before = &before[before.find("NOTES\n").expect("notes")..];
            assert!(after.ends_with(notes_before));
            assert!(after.contains("  - b\n"));
        }

        #[test]
        fn refresh_without_anchors_leaves_the_file_alone() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("doc.txt");
            let text = "hand written\nno sections here\n";
            fs::write(&path, text).expect("seed");
            let err = refresh_files_and_datasheets(&path, &listing(&["a"])).expect_err("missing");
            assert!(matches!(
                err,
                OverviewError::SectionNotFound {
                    section: "DESCRIPTION",
                    ..
                }
            ));
            assert_eq!(read(&path), text);
        }

        #[test]
        fn status_entries_go_newest_first() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("doc.txt");
            ensure_exists(&path, &meta(), &listing(&[])).expect("create");
            record_status_change_at(&path, Some("Planning"), "Active", at(1)).expect("first");
            record_status_change_at(&path, Some("Active"), "On Hold", at(2)).expect("second");

            let text = read(&path);
            let history = crate::parser::section_body(&text, SectionKind::StatusHistory);
            assert_eq!(
                history,
                "[2024-04-02 08:30:00] Status changed: Active -> On Hold\n\
                 [2024-04-01 08:30:00] Status changed: Planning -> Active"
            );
            assert!(parse_todo_section(&text).is_empty());
        }

        #[test]
        fn status_section_is_appended_when_missing() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("doc.txt");
            fs::write(&path, "notes only").expect("seed");
            record_status_change_at(&path, None, "Active", at(5)).expect("record");
            let expected = format!(
                "notes only\n\n{rule}\nSTATUS HISTORY\n{rule}\n[2024-04-05 08:30:00] Status changed: None -> Active\n",
                rule = crate::section::MINOR_RULE
            );
            assert_eq!(read(&path), expected);
        }
    }
}

pub mod mutate {
    //! Line-addressed edits of the TODO section.
    //!
    //! Line numbers come from `parser::parse_todo_section` and go stale after any write. The
    //! `*_item` variants take a position in the parsed item list instead and resolve it against
    //! a fresh parse right before the single edit they make; prefer them.

    use crate::codec::{new_todo_line, toggle_marker};
    use crate::core::{OverviewError, Outcome, Result, TodoItem};
    use crate::parser::parse_todo_lines;
    use crate::section::SectionKind;
    use crate::text::LineBuffer;
    use chrono::{Local, NaiveDateTime};
    use std::path::Path;
    use tracing::{debug, info, warn};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Direction {
        Up,
        Down,
    }

    /// Insert `[ ] [<now>] <description>` directly under the TODO heading. Returns the new line's
    /// number.
    pub fn append_todo(path: &Path, description: &str) -> Result<usize> {
        append_todo_at(path, description, Local::now().naive_local())
    }

    pub fn append_todo_at(path: &Path, description: &str, now: NaiveDateTime) -> Result<usize> {
        let description = description.trim();
        if description.is_empty() {
            return Err(OverviewError::InvalidInput(
                "TODO description is empty".into(),
            ));
        }
        if description.contains(['\n', '\r']) {
            return Err(OverviewError::InvalidInput(
                "TODO description must be a single line".into(),
            ));
        }

        let mut buffer = LineBuffer::read(path)?;
        let header = find_todo_header(&buffer.lines)
            .ok_or_else(|| OverviewError::section_not_found(SectionKind::Todo, path))?;
        let line_number = header + 3;
        buffer
            .lines
            .insert(line_number, new_todo_line(description, now));
        buffer.write(path)?;
        info!(path = %path.display(), line_number, "added TODO");
        Ok(line_number)
    }

    /// Index of the opening rule of the literal TODO heading block.
    fn find_todo_header(lines: &[String]) -> Option<usize> {
        let heading = SectionKind::Todo.heading();
        lines.windows(3).position(|window| {
            window
                .iter()
                .zip(heading)
                .all(|(line, expected)| line.trim_end() == expected)
        })
    }

    pub fn toggle_todo(path: &Path, line_number: usize) -> Result<Outcome> {
        edit(path, |buffer| toggle_line(buffer, line_number))
    }

    pub fn delete_todo(path: &Path, line_number: usize) -> Result<Outcome> {
        edit(path, |buffer| delete_line(buffer, line_number))
    }

    /// Exchange two lines. Either index out of range aborts without writing.
    pub fn swap_lines(path: &Path, a: usize, b: usize) -> Result<Outcome> {
        edit(path, |buffer| swap_in(buffer, a, b))
    }

    pub fn toggle_item(path: &Path, index: usize) -> Result<Outcome> {
        edit(path, |buffer| match nth_item(buffer, index) {
            Some(item) => toggle_line(buffer, item.line_number),
            None => stale(index),
        })
    }

    pub fn delete_item(path: &Path, index: usize) -> Result<Outcome> {
        edit(path, |buffer| match nth_item(buffer, index) {
            Some(item) => delete_line(buffer, item.line_number),
            None => stale(index),
        })
    }

    /// Swap an item with its displayed neighbour. Items need not be adjacent in the file; blank
    /// or comment lines between them stay where they are.
    pub fn move_item(path: &Path, index: usize, direction: Direction) -> Result<Outcome> {
        edit(path, |buffer| {
            let items = parse_todo_lines(&buffer.lines);
            let target = match direction {
                Direction::Up => index.checked_sub(1),
                Direction::Down => index.checked_add(1),
            };
            match (items.get(index), target.and_then(|t| items.get(t))) {
                (Some(item), Some(neighbour)) => {
                    swap_in(buffer, item.line_number, neighbour.line_number)
                }
                _ => stale(index),
            }
        })
    }

    /// Parse the file now and return the item at display position `index`.
    pub fn resolve_item(path: &Path, index: usize) -> Result<Option<TodoItem>> {
        let buffer = LineBuffer::read(path)?;
        Ok(nth_item(&buffer, index))
    }

    fn edit(path: &Path, apply: impl FnOnce(&mut LineBuffer) -> Outcome) -> Result<Outcome> {
        let mut buffer = LineBuffer::read(path)?;
        let outcome = apply(&mut buffer);
        if outcome == Outcome::Applied {
            buffer.write(path)?;
            debug!(path = %path.display(), "wrote mutation");
        }
        Ok(outcome)
    }

    fn nth_item(buffer: &LineBuffer, index: usize) -> Option<TodoItem> {
        parse_todo_lines(&buffer.lines).into_iter().nth(index)
    }

    fn stale(handle: usize) -> Outcome {
        warn!(handle, "TODO handle no longer resolves; nothing changed");
        Outcome::Unchanged
    }

    fn toggle_line(buffer: &mut LineBuffer, line_number: usize) -> Outcome {
        let Some(line) = buffer.lines.get_mut(line_number) else {
            return stale(line_number);
        };
        match toggle_marker(line) {
            Some(toggled) => {
                *line = toggled;
                Outcome::Applied
            }
            None => Outcome::Unchanged,
        }
    }

    fn delete_line(buffer: &mut LineBuffer, line_number: usize) -> Outcome {
        if line_number >= buffer.lines.len() {
            return stale(line_number);
        }
        buffer.lines.remove(line_number);
        Outcome::Applied
    }

    fn swap_in(buffer: &mut LineBuffer, a: usize, b: usize) -> Outcome {
        let len = buffer.lines.len();
        if a >= len || b >= len {
            return stale(a.max(b));
        }
        if a == b {
            return Outcome::Unchanged;
        }
        buffer.lines.swap(a, b);
        Outcome::Applied
    }

}

pub mod projectors {
    pub mod digest_projector {
        //! Outstanding TODO items across every project, as a printable plain-text report.

        use crate::codec::STATUS_TIMESTAMP_FORMAT;
        use crate::core::TodoItem;
        use crate::format::wrap_line;
        use crate::parser::parse_todo_section;
        use crate::section::{MAJOR_RULE, MINOR_RULE};
        use crate::storage::ProjectCatalog;
        use crate::workspace::Layout;
        use anyhow::{Context, Result};
        use chrono::NaiveDateTime;
        use std::{fmt::Write, fs};
        use tracing::debug;

        pub const DIGEST_WIDTH: usize = 78;
        const ITEM_PREFIX: &str = "  [ ] ";

        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct ProjectTodos {
            pub display_name: String,
            pub items: Vec<TodoItem>,
        }

        /// Incomplete items of every project whose overview exists, in catalog order.
        pub fn collect_outstanding(
            catalog: &dyn ProjectCatalog,
            layout: &Layout,
        ) -> Result<Vec<ProjectTodos>> {
            let mut out = Vec::new();
            for project in catalog.projects()? {
                let path = layout.overview_path(&project);
                if !path.exists() {
                    debug!(project = %project.display_name(), "no overview document");
                    continue;
                }
                let text =
                    fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
                let items: Vec<TodoItem> = parse_todo_section(&text)
                    .into_iter()
                    .filter(|item| !item.is_completed)
                    .collect();
                if !items.is_empty() {
                    out.push(ProjectTodos {
                        display_name: project.display_name(),
                        items,
                    });
                }
            }
            Ok(out)
        }

        pub fn outstanding_count(projects: &[ProjectTodos]) -> usize {
            projects
                .iter()
                .flat_map(|p| &p.items)
                .filter(|item| !item.is_completed)
                .count()
        }

        pub fn render_digest(projects: &[ProjectTodos], generated: NaiveDateTime) -> String {
            let mut out = String::new();
            let _ = writeln!(out, "{MAJOR_RULE}");
            let _ = writeln!(out, "OUTSTANDING TODO ITEMS");
            let _ = writeln!(out, "Generated: {}", generated.format(STATUS_TIMESTAMP_FORMAT));
            let _ = writeln!(out, "{MAJOR_RULE}");
            out.push('\n');

            for project in projects {
                let open: Vec<&TodoItem> =
                    project.items.iter().filter(|i| !i.is_completed).collect();
                if open.is_empty() {
                    continue;
                }
                let _ = writeln!(out, "{MINOR_RULE}");
                let _ = writeln!(out, "{}", project.display_name);
                let _ = writeln!(out, "{MINOR_RULE}");
                for item in open {
                    let _ = writeln!(out, "{}", render_item(item));
                }
                out.push('\n');
            }

            if outstanding_count(projects) == 0 {
                out.push_str("No outstanding TODO items found.\n");
            }
            out
        }

        /// `  [ ] [timestamp] description`, wrapped so continuations line up under the
        /// description rather than the marker.
        pub fn render_item(item: &TodoItem) -> String {
            let full = format!("{ITEM_PREFIX}{}", item.body());
            if full.chars().count() <= DIGEST_WIDTH {
                return full;
            }
            let description_start = match &item.timestamp {
                Some(ts) => ITEM_PREFIX.len() + ts.chars().count() + 3,
                None => ITEM_PREFIX.len(),
            };
            // Odd hand-written timestamps would leave no room for text.
            let indent = " ".repeat(description_start.min(DIGEST_WIDTH / 2));
            wrap_line(&full, DIGEST_WIDTH, &indent)
        }

        #[cfg(test)]
        mod tests {
            use super::*;
            use crate::codec::parse_todo_line;
            use crate::core::{AppInfo, DescriptionListing, ProjectMeta};
            use crate::mutate::{append_todo, toggle_item};
            use crate::writer::ensure_exists;
            use chrono::NaiveDate;

            struct FixedCatalog(Vec<ProjectMeta>);

            impl ProjectCatalog for FixedCatalog {
                fn projects(&self) -> Result<Vec<ProjectMeta>> {
                    Ok(self.0.clone())
                }

                fn apps(&self) -> Result<Vec<AppInfo>> {
                    Ok(vec![])
                }

                fn set_status(&mut self, _: i64, _: &str) -> Result<()> {
                    Ok(())
                }
            }

            fn project(id: i64, number: &str) -> ProjectMeta {
                ProjectMeta {
                    id,
                    number: number.into(),
                    name: "Board".into(),
                    revision: 1,
                    created: NaiveDate::from_ymd_opt(2024, 2, 2).expect("date"),
                    status: "Active".into(),
                    issues: String::new(),
                    app_ids: vec![],
                    datasheets: vec![],
                }
            }

            fn generated() -> NaiveDateTime {
                NaiveDate::from_ymd_opt(2024, 7, 1)
                    .and_then(|d| d.and_hms_opt(12, 0, 0))
                    .expect("datetime")
            }

            fn item(raw: &str) -> TodoItem {
                parse_todo_line(raw, 0).expect("item")
            }

            #[test]
            fn empty_digest_says_so() {
                let text = render_digest(&[], generated());
                assert!(text.contains("Generated: 2024-07-01 12:00:00\n"));
                assert!(text.ends_with("No outstanding TODO items found.\n"));
            }

            #[test]
            fn long_items_wrap_under_the_description() {
                let long = item(
                    "[ ] [2024-01-01 10:00] Replace the input connector with a latching type and \
                     update every drawing that references the old part number",
                );
                let rendered = render_item(&long);
                let lines: Vec<&str> = rendered.lines().collect();
                assert!(lines.len() > 1);
                assert!(lines[0].starts_with("  [ ] [2024-01-01 10:00] Replace"));
                for line in &lines {
                    assert!(line.chars().count() <= DIGEST_WIDTH, "{line:?}");
                }
                let indent = " ".repeat(25);
                for line in &lines[1..] {
                    assert!(line.starts_with(&indent));
                    assert!(!line[25..].starts_with(' '));
                }
            }

            #[test]
            fn digest_lists_only_open_items() {
                let projects = vec![ProjectTodos {
                    display_name: "0001_Board_Rev1".into(),
                    items: vec![item("[ ] [t] open one"), item("[x] [t] done")],
                }];
                let text = render_digest(&projects, generated());
                assert!(text.contains(&format!("{MINOR_RULE}\n0001_Board_Rev1\n{MINOR_RULE}\n")));
                assert!(text.contains("  [ ] [t] open one\n"));
                assert!(!text.contains("done"));
                assert_eq!(outstanding_count(&projects), 1);
            }

            #[test]
            fn collects_across_projects_and_skips_missing_files() {
                let tmp = tempfile::tempdir().expect("tempdir");
                let layout = Layout::new(tmp.path(), None);
                let with_todos = project(1, "0002");
                let all_done = project(2, "0001");
                let no_file = project(3, "0003");

                for p in [&with_todos, &all_done] {
                    let path = layout.overview_path(p);
                    ensure_exists(&path, p, &DescriptionListing::default()).expect("create");
                    append_todo(&path, "solder headers").expect("append");
                }
                toggle_item(&layout.overview_path(&all_done), 0).expect("complete");

                let catalog = FixedCatalog(vec![no_file, with_todos.clone(), all_done]);
                let collected = collect_outstanding(&catalog, &layout).expect("collect");
                assert_eq!(collected.len(), 1);
                assert_eq!(collected[0].display_name, with_todos.display_name());
                assert_eq!(collected[0].items[0].description, "solder headers");
            }
        }
    }
}

pub use codec::{encode_item, parse_todo_line};
pub use crate::core::{Outcome, OverviewError, TodoItem};
pub use format::wrap_line;
pub use mutate::{append_todo, delete_todo, swap_lines, toggle_todo};
pub use parser::parse_todo_section;
pub use writer::{ensure_exists, refresh_files_and_datasheets, regenerate};
