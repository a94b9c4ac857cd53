use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context;
use clap::{ArgAction, Parser};
use codesnake::{Block, CodeWidth, Label, LineIndex};
use mellon::{
    ast::{image::render_png, serial::Dump},
    compile_tree, compile_with, read_tree, Compilation, CompileError, CompileOptions,
};
use tracing::{info, level_filters::LevelFilter, warn};
use yansi::Paint;

/// Compile a Mellon program to stack-machine assembly on stdout.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Source file, or a tree dump when `--from-ast` is given
    input: PathBuf,
    /// Where to write the tree dump of the compiled program
    #[arg(default_value = "tree.ast")]
    dump: PathBuf,
    /// Read INPUT as a tree dump instead of source text
    #[arg(long)]
    from_ast: bool,
    /// Also render the tree to this PNG through Graphviz `dot`
    #[arg(long, value_name = "PNG")]
    image: Option<PathBuf>,
    /// Function that runs first
    #[arg(long, default_value = "main")]
    entry: String,
    #[arg(long, env = "MELLON_LOG", default_value_t = LevelFilter::WARN)]
    log_level: LevelFilter,
    /// Raise the log level once per occurrence
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn log_level(base: LevelFilter, raise: u8) -> LevelFilter {
    const LEVELS: [LevelFilter; 6] = [
        LevelFilter::OFF,
        LevelFilter::ERROR,
        LevelFilter::WARN,
        LevelFilter::INFO,
        LevelFilter::DEBUG,
        LevelFilter::TRACE,
    ];
    let start = LEVELS.iter().position(|l| *l == base).unwrap_or(2);
    LEVELS[(start + usize::from(raise)).min(LEVELS.len() - 1)]
}

/// Widen an empty span to the character before it so there is something to underline.
fn visible_span(source: &str, span: mellon::lexer::Span) -> mellon::lexer::Span {
    if !span.is_empty() {
        return span;
    }
    match source[..span.start.min(source.len())].char_indices().last() {
        Some((start, c)) => start..start + c.len_utf8(),
        None => span,
    }
}

fn report(path: &Path, source: &str, err: &CompileError) {
    eprintln!("{} {err}", "error:".red().bold());
    let Some(span) = err.span() else { return };
    let span = visible_span(source, span);
    if span.is_empty() {
        return;
    }

    let idx = LineIndex::new(source);
    let text = err.to_string();
    let label = Label::new(span)
        .with_text(text.red().to_string())
        .with_style(|s: String| s.red().to_string());
    let Some(block) = Block::new(&idx, [label]) else {
        return;
    };
    let block = block.map_code(|c| CodeWidth::new(c, c.len()));
    eprintln!("{}[{}]", block.prologue(), path.display());
    eprint!("{block}");
    eprintln!("{}", block.epilogue());
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(log_level(args.log_level, args.verbose))
        .with_writer(io::stderr)
        .init();

    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("could not read {}", args.input.display()))?;
    let options = CompileOptions {
        entry: args.entry.into_boxed_str(),
    };

    let result = if args.from_ast {
        read_tree(&source)
            .map_err(CompileError::from)
            .and_then(compile_tree)
    } else {
        compile_with(&source, &options)
    };

    let Compilation { tree, assembly } = match result {
        Ok(compilation) => compilation,
        Err(CompileError::Verify(errors)) => {
            eprintln!("{} {errors}", "error:".red().bold());
            return Ok(ExitCode::from(errors.bits()));
        }
        Err(err) => {
            report(&args.input, &source, &err);
            std::process::abort();
        }
    };

    fs::write(&args.dump, Dump(&tree).to_string())
        .with_context(|| format!("could not write {}", args.dump.display()))?;
    info!(path = %args.dump.display(), "wrote tree dump");

    if let Some(png) = &args.image {
        let dot = png.with_extension("dot");
        if let Err(err) = render_png(&tree, &dot, png) {
            warn!(%err, "could not render the tree image");
        }
    }

    let mut stdout = io::stdout().lock();
    stdout.write_all(assembly.as_bytes())?;
    stdout.flush()?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use assert2::check;
    use clap::Parser;
    use tracing::level_filters::LevelFilter;

    use super::{log_level, visible_span, Args};

    #[test]
    fn verbosity_raises_the_level() {
        check!(log_level(LevelFilter::WARN, 0) == LevelFilter::WARN);
        check!(log_level(LevelFilter::WARN, 2) == LevelFilter::DEBUG);
        check!(log_level(LevelFilter::ERROR, 9) == LevelFilter::TRACE);
    }

    #[test]
    fn empty_spans_are_widened() {
        check!(visible_span("ab", 2..2) == (1..2));
        check!(visible_span("ab", 0..1) == (0..1));
        check!(visible_span("", 0..0) == (0..0));
    }

    #[test]
    fn defaults() {
        let args = Args::parse_from(["mellon", "prog.mln"]);
        check!(args.dump.to_str() == Some("tree.ast"));
        check!(args.entry == "main");
        check!(!args.from_ast);
    }
}
