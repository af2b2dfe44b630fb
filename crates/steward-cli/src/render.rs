use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};
use steward_core::{ComponentKind, UpdateEntry, UpdateSnapshot, VersionUpdateStatus};
use steward_maintenance::UpdateOutcome;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

pub(crate) struct RemoteCheckSpinner {
    style: OutputStyle,
    label: String,
    progress_bar: Option<ProgressBar>,
    started_at: Instant,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        self.print_lines(&[render_status_line(self.style, status, message)]);
    }

    pub(crate) fn print_section(self, title: &str) {
        if self.style == OutputStyle::Rich {
            println!();
            println!("{}", colorize(section_style(), &format!("== {title} ==")));
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            match self.style {
                OutputStyle::Plain => println!("{line}"),
                OutputStyle::Rich => println!("{}", paint_badge(line)),
            }
        }
    }

    pub(crate) fn start_remote_check(self, label: &str) -> RemoteCheckSpinner {
        let progress_bar = if self.style == OutputStyle::Rich {
            let progress_bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg}") {
                progress_bar.set_style(style.tick_chars("<^>v "));
            }
            progress_bar.set_message(label.to_string());
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            Some(progress_bar)
        } else {
            None
        };

        RemoteCheckSpinner {
            style: self.style,
            label: label.to_string(),
            progress_bar,
            started_at: Instant::now(),
        }
    }
}

impl RemoteCheckSpinner {
    pub(crate) fn finish(mut self) {
        let Some(progress_bar) = self.progress_bar.take() else {
            return;
        };
        progress_bar.finish_and_clear();
        if self.style == OutputStyle::Rich {
            println!(
                "{} complete in {}",
                colorize(progress_label_style(), &self.label),
                format_elapsed(self.started_at.elapsed())
            );
        }
    }
}

pub(crate) fn current_output_style() -> OutputStyle {
    output_style_for(
        std::io::stdout().is_terminal(),
        std::env::var_os("NO_COLOR").is_some(),
    )
}

pub(crate) fn output_style_for(is_terminal: bool, no_color: bool) -> OutputStyle {
    if is_terminal && !no_color {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "update" => "[UPD]",
        "critical" => "[CRIT]",
        "warn" => "[WARN]",
        "error" => "[ERR]",
        _ => "[..]",
    }
}

fn badge_style(badge: &str) -> Style {
    let color = match badge {
        "[OK]" => AnsiColor::BrightGreen,
        "[UPD]" => AnsiColor::BrightCyan,
        "[CRIT]" | "[ERR]" => AnsiColor::BrightRed,
        "[WARN]" => AnsiColor::BrightYellow,
        _ => AnsiColor::BrightBlack,
    };
    Style::new()
        .fg_color(Some(color.into()))
        .effects(Effects::BOLD)
}

fn paint_badge(line: &str) -> String {
    if !line.starts_with('[') {
        return line.to_string();
    }
    match line.find(']') {
        Some(end) => {
            let (badge, rest) = line.split_at(end + 1);
            format!("{}{rest}", colorize(badge_style(badge), badge))
        }
        None => line.to_string(),
    }
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn progress_label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn status_token(status: VersionUpdateStatus) -> &'static str {
    match status {
        VersionUpdateStatus::UpToDate => "ok",
        VersionUpdateStatus::UpdateAvailable => "update",
        VersionUpdateStatus::Unknown => "warn",
    }
}

pub(crate) fn format_snapshot_lines(
    snapshot: &UpdateSnapshot,
    core_name: &str,
    style: OutputStyle,
) -> Vec<String> {
    if snapshot.is_empty() {
        return vec![render_status_line(
            style,
            "info",
            "no update data reported by the telemetry authority",
        )];
    }

    let core = &snapshot.core;
    let core_status = if core.critical_update_available && core.update_available() {
        "critical"
    } else {
        status_token(core.status)
    };
    let mut lines = vec![render_status_line(
        style,
        core_status,
        &format!(
            "{core_name} {} (build {}) -> {} (build {}): {}",
            core.local_version,
            core.local_build,
            core.latest_version,
            core.latest_build,
            core.status.as_str()
        ),
    )];

    for extension in snapshot.extensions.values() {
        let status = if extension.critical_update_available() {
            "critical"
        } else {
            status_token(extension.status)
        };
        lines.push(render_status_line(
            style,
            status,
            &format!(
                "{} ({}) {} -> {}: {}",
                extension.display_name,
                extension.id,
                extension.local_version,
                extension.latest_version,
                extension.status.as_str()
            ),
        ));
    }

    if core.manual_update_required {
        lines.push(render_status_line(
            style,
            "warn",
            "the pending core update must be applied manually",
        ));
    }
    lines
}

pub(crate) fn format_update_entry_lines(
    entries: &[UpdateEntry],
    style: OutputStyle,
) -> Vec<String> {
    if entries.is_empty() {
        return vec![render_status_line(style, "ok", "everything is up to date")];
    }

    let mut lines = Vec::new();
    for entry in entries {
        let status = if entry.critical { "critical" } else { "update" };
        let kind = match entry.kind {
            ComponentKind::Core => "core",
            ComponentKind::Extension => "extension",
        };
        let mut heading = format!("{kind} {} ({}): {}", entry.name, entry.handle, entry.version);
        if entry.critical {
            heading.push_str(" critical");
        }
        if entry.manual_update_required == Some(true) {
            heading.push_str(" manual-update-required");
        }
        lines.push(render_status_line(style, status, &heading));
        lines.extend(
            notes_as_text(&entry.notes)
                .into_iter()
                .map(|line| format!("    {line}")),
        );
    }
    lines
}

pub(crate) fn notes_as_text(html: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        current.push_str(&rest[..start]);
        let Some(end) = rest[start..].find('>') else {
            current.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let tag = rest[start + 1..start + end]
            .trim()
            .to_ascii_lowercase();
        let name = tag.split_whitespace().next().unwrap_or_default();
        match name {
            "li" => {
                push_line(&mut lines, &mut current);
                current.push_str("- ");
            }
            "/h5" | "/li" | "br" | "br/" | "/p" => push_line(&mut lines, &mut current),
            _ => {}
        }
        rest = &rest[start + end + 1..];
    }
    current.push_str(rest);
    push_line(&mut lines, &mut current);
    lines
}

fn push_line(lines: &mut Vec<String>, current: &mut String) {
    let line = current.trim();
    if !line.is_empty() && line != "-" {
        lines.push(line.to_string());
    }
    current.clear();
}

pub(crate) fn format_apply_outcome_lines(
    outcome: &UpdateOutcome,
    style: OutputStyle,
) -> Vec<String> {
    let mut lines = vec![render_status_line(
        style,
        "ok",
        &format!("updated {}", outcome.target),
    )];
    if !outcome.quiesced {
        lines.push(render_status_line(
            style,
            "warn",
            "system could not be taken offline during the update",
        ));
    }
    if !outcome.restored {
        lines.push(render_status_line(
            style,
            "error",
            "system was not restored to live; run `steward system on`",
        ));
    }
    if outcome.cache_flushed {
        lines.push(render_status_line(
            style,
            "info",
            "cached update information cleared",
        ));
    }
    lines
}
