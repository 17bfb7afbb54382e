//! Log filter: demultiplexes the single append-only task log into
//! per-task and per-group slices, including the multi-line HTTP
//! request/response spans the built-in action emits.
//!
//! A capture-mode state machine keeps an HTTP span's intermediate lines -
//! which don't all repeat the task id - attached to the task that started
//! it.

use chrono::{Duration as ChronoDuration, Local};
use scheduler_core::SchedulerError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const HTTP_START_MARKER: &str = "开始执行HTTP请求";
const HTTP_TERMINAL_MARKERS: [&str; 3] = ["HTTP请求完成", "HTTP请求发生错误", "HTTP请求任务执行完成"];

#[derive(Debug, Clone, serde::Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

/// Identifies an entity (task or group) for log projection by the two
/// substrings that can appear in a log line about it.
#[derive(Debug, Clone)]
pub struct EntityRef {
    pub id: String,
    pub name: String,
}

pub struct LogFilter {
    path: PathBuf,
}

impl LogFilter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// All log entries, windowed by `days` and capped to the last `lines`.
    pub fn get_all(&self, lines: usize, days: u32) -> Result<Vec<LogEntry>, SchedulerError> {
        let raw = self.read_windowed(days)?;
        Ok(cap_and_format(&raw, lines))
    }

    /// Lines pertaining to a single task: direct mentions of its id/name,
    /// plus every line inside an HTTP span one of those mentions opened.
    pub fn get_for_task(
        &self,
        task: &EntityRef,
        lines: usize,
        days: u32,
    ) -> Result<Vec<LogEntry>, SchedulerError> {
        let windowed = self.read_windowed(days)?;
        let filtered = filter_for_entity(&windowed, task);
        Ok(cap_and_format(&filtered, lines))
    }

    /// Lines pertaining to a group: the union of direct mentions of the
    /// group and the per-task projection of each member, merged and
    /// re-sorted by timestamp.
    pub fn get_for_group(
        &self,
        group: &EntityRef,
        members: &[EntityRef],
        lines: usize,
        days: u32,
    ) -> Result<Vec<LogEntry>, SchedulerError> {
        let windowed = self.read_windowed(days)?;
        let mut merged = filter_for_entity(&windowed, group);
        for member in members {
            merged.extend(filter_for_entity(&windowed, member));
        }
        merged.sort_by(|a, b| a.cmp(b));
        merged.dedup();
        Ok(cap_and_format(&merged, lines))
    }

    /// Clears log lines for the given entities (a single task, or a group
    /// plus its members, matching the union the read side projects), or
    /// every windowed line when `entities` is empty. The current file is
    /// copied to a timestamped backup before the destructive rewrite.
    pub fn clear(
        &self,
        entities: &[EntityRef],
        days: u32,
        stamp: &str,
    ) -> Result<usize, SchedulerError> {
        if !self.path.exists() {
            return Ok(0);
        }
        let backup_path = self
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!("tasks_backup_{stamp}.log"));
        fs::copy(&self.path, &backup_path)
            .map_err(|e| SchedulerError::Internal(format!("failed to back up log: {e}")))?;

        let all = read_lines(&self.path)?;
        let mut remove = day_mask(&all, days);
        if !entities.is_empty() {
            let mut matched = vec![false; all.len()];
            for entity in entities {
                for (seen, hit) in matched.iter_mut().zip(entity_mask(&all, entity)) {
                    *seen |= hit;
                }
            }
            for (line_removed, line_matched) in remove.iter_mut().zip(&matched) {
                *line_removed &= line_matched;
            }
        }

        let removed_count = remove.iter().filter(|&&r| r).count();
        let remaining: String = all
            .iter()
            .zip(&remove)
            .filter(|(_, &removed)| !removed)
            .map(|(line, _)| line.as_str())
            .collect();

        fs::write(&self.path, remaining)
            .map_err(|e| SchedulerError::Internal(format!("failed to rewrite log: {e}")))?;
        Ok(removed_count)
    }

    fn read_windowed(&self, days: u32) -> Result<Vec<String>, SchedulerError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let all = read_lines(&self.path)?;
        let mask = day_mask(&all, days);
        Ok(all
            .into_iter()
            .zip(mask)
            .filter_map(|(line, keep)| keep.then_some(line))
            .collect())
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>, SchedulerError> {
    let content = fs::read_to_string(path)
        .map_err(|e| SchedulerError::Internal(format!("failed to read log file: {e}")))?;
    Ok(content.lines().map(|l| format!("{l}\n")).collect())
}

/// Day-window mask: lines dated before the cutoff drop out; lines without a
/// leading date (continuations, malformed lines) are retained.
fn day_mask(lines: &[String], days: u32) -> Vec<bool> {
    if days == 0 {
        return vec![true; lines.len()];
    }
    let cutoff = (Local::now() - ChronoDuration::days(days as i64))
        .format("%Y-%m-%d")
        .to_string();
    lines
        .iter()
        .map(|line| {
            line.get(..10)
                .map_or(true, |prefix| prefix >= cutoff.as_str())
        })
        .collect()
}

/// Per-line retention mask for `entity`: direct mentions of its id (or,
/// when no id mention exists anywhere, its name), widened so an HTTP span
/// opened by a retained line stays retained through its terminal marker
/// even where intermediate lines don't repeat the id.
fn entity_mask(lines: &[String], entity: &EntityRef) -> Vec<bool> {
    let id_pattern = format!("ID: {}", entity.id);
    let mut mask: Vec<bool> = lines.iter().map(|l| l.contains(&id_pattern)).collect();
    if !mask.iter().any(|&hit| hit) {
        for (hit, line) in mask.iter_mut().zip(lines) {
            *hit = line.contains(entity.name.as_str());
        }
    }

    let mut capturing = false;
    for (hit, line) in mask.iter_mut().zip(lines) {
        if capturing {
            *hit = true;
        }
        if *hit && line.contains(HTTP_START_MARKER) {
            capturing = true;
        } else if capturing && HTTP_TERMINAL_MARKERS.iter().any(|m| line.contains(m)) {
            capturing = false;
        }
    }
    mask
}

fn filter_for_entity(lines: &[String], entity: &EntityRef) -> Vec<String> {
    entity_mask(lines, entity)
        .into_iter()
        .zip(lines)
        .filter_map(|(keep, line)| keep.then(|| line.clone()))
        .collect()
}

fn cap_and_format(lines: &[String], lines_limit: usize) -> Vec<LogEntry> {
    let capped = if lines_limit > 0 && lines.len() > lines_limit {
        &lines[lines.len() - lines_limit..]
    } else {
        lines
    };
    capped.iter().filter_map(|l| parse_line(l)).collect()
}

fn level_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| regex::Regex::new(r"\b(INFO|ERROR|WARNING|DEBUG|CRITICAL)\b").unwrap())
}

fn date_prefix_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| regex::Regex::new(r"^\d{4}-\d{2}-\d{2}[^ ]*").unwrap())
}

fn parse_line(raw: &str) -> Option<LogEntry> {
    let line = raw.trim();
    if line.is_empty() {
        return None;
    }

    let parts: Vec<&str> = line.splitn(3, " - ").collect();
    if parts.len() == 3 {
        return Some(LogEntry {
            timestamp: parts[0].trim().to_string(),
            level: parts[1].trim().to_string(),
            message: parts[2].trim().to_string(),
        });
    }

    if let Some(date_match) = date_prefix_pattern().find(line) {
        let timestamp = date_match.as_str().to_string();
        let rest = line[date_match.end()..].trim();
        if let Some(level_match) = level_pattern().find(rest) {
            let level = level_match.as_str().to_string();
            let message = rest.replacen(&level, "", 1).trim().to_string();
            return Some(LogEntry {
                timestamp,
                level,
                message,
            });
        }
        return Some(LogEntry {
            timestamp,
            level: "INFO".to_string(),
            message: rest.to_string(),
        });
    }

    Some(LogEntry {
        timestamp: String::new(),
        level: "INFO".to_string(),
        message: line.to_string(),
    })
}
