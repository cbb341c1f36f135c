//! Terminal rendering of search results

use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::error::SearchError;
use crate::query::request::{
    HIGHLIGHT_POST, HIGHLIGHT_PRE, SUGGESTION_HIGHLIGHT_POST, SUGGESTION_HIGHLIGHT_PRE,
};
use crate::results::{ResultSet, SearchHit};

fn stdout(color: bool) -> StandardStream {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

/// Print a result set to stdout
pub fn print_results(results: &ResultSet, color: bool) -> io::Result<()> {
    let mut out = stdout(color);
    write_results(&mut out, results)
}

/// Print a search failure to stderr
pub fn print_error(error: &SearchError, color: bool) -> io::Result<()> {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut err = StandardStream::stderr(choice);
    err.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
    write!(err, "{}", error.message_key())?;
    err.reset()?;
    writeln!(err, ": {}", error)
}

/// Render a result set
pub fn write_results<W: WriteColor>(out: &mut W, results: &ResultSet) -> io::Result<()> {
    for warning in &results.warnings {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
        writeln!(out, "warning: {}", warning)?;
        out.reset()?;
    }

    if let Some(suggestion) = &results.suggestion {
        write!(out, "Did you mean: ")?;
        write_marked(
            out,
            &suggestion.snippet,
            SUGGESTION_HIGHLIGHT_PRE,
            SUGGESTION_HIGHLIGHT_POST,
            ColorSpec::new().set_bold(true).set_italic(true),
        )?;
        writeln!(out)?;
    }

    for hit in &results.hits {
        write_hit(out, hit)?;
    }

    out.set_color(ColorSpec::new().set_dimmed(true))?;
    write!(out, "{} of {} results ({} ms)", results.hits.len(), results.total, results.took_ms)?;
    if results.timed_out {
        write!(out, ", partial")?;
    }
    writeln!(out)?;
    out.reset()?;
    Ok(())
}

fn write_hit<W: WriteColor>(out: &mut W, hit: &SearchHit) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
    write!(out, "{}", hit.full_title())?;
    out.reset()?;

    if let Some(id) = hit.page_id {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        write!(out, " [{}]", id)?;
        out.reset()?;
    }
    if let Some(score) = hit.score {
        write!(out, " {:.3}", score)?;
    }
    writeln!(out)?;

    if let Some(snippet) = hit.best_snippet() {
        write!(out, "    ")?;
        write_marked(
            out,
            snippet,
            HIGHLIGHT_PRE,
            HIGHLIGHT_POST,
            ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true),
        )?;
        writeln!(out)?;
    }
    Ok(())
}

/// Write `text`, colouring the spans between `pre` and `post` markers
fn write_marked<W: WriteColor>(
    out: &mut W,
    text: &str,
    pre: &str,
    post: &str,
    spec: &ColorSpec,
) -> io::Result<()> {
    let mut rest = text;
    while let Some(start) = rest.find(pre) {
        write!(out, "{}", &rest[..start])?;
        let marked = &rest[start + pre.len()..];
        let end = marked.find(post).unwrap_or(marked.len());
        out.set_color(spec)?;
        write!(out, "{}", &marked[..end])?;
        out.reset()?;
        rest = marked.get(end + post.len()..).unwrap_or("");
    }
    write!(out, "{}", rest)
}
