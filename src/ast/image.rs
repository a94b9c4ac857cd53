//! Debug rendering of a tree through Graphviz.
//!
//! This is a side channel for humans; nothing here changes the tree.
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
    process::{Command, ExitStatus},
};

use tracing::debug;

use super::{NodeId, NodeKind, Tree};

#[derive(thiserror::Error, Debug)]
pub enum ImageError {
    #[error("could not write the graph description: {0}")]
    Io(#[from] io::Error),
    #[error("`dot` could not be started: {0}")]
    Spawn(io::Error),
    #[error("`dot` exited with {0}")]
    Layout(ExitStatus),
}

fn label(tree: &Tree, kind: NodeKind) -> String {
    match kind {
        NodeKind::NoType => String::from("none"),
        NodeKind::Number(value) => format!("{value}"),
        NodeKind::Variable(index) => format!(
            "{} {index} | {}",
            kind.tag(),
            tree.vars.resolve(index).unwrap_or("?")
        ),
        NodeKind::Function(index) => format!(
            "{} {index} | {}",
            kind.tag(),
            tree.funcs.resolve(index).unwrap_or("?")
        ),
        _ => format!("{} {} | {kind}", kind.tag(), kind.payload()),
    }
}

fn escape(text: &str) -> String {
    text.chars()
        .flat_map(|c| match c {
            '"' | '<' | '>' | '{' | '}' | '\\' => vec!['\\', c],
            c => vec![c],
        })
        .collect()
}

/// Write the tree as a Graphviz `digraph`, one record per node.
pub fn write_dot(tree: &Tree, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "digraph G\n{{")?;
    writeln!(out, "    rankdir = UD;")?;
    writeln!(out, "    bgcolor = \"#ff8080\";")?;
    writeln!(out, "    node  [style = filled, color = white];")?;
    writeln!(out, "    edge  [color = \"darkgreen\", fontcolor = \"blue\", fontsize = 15];")?;
    writeln!(out)?;
    writeln!(out, "    subgraph cluster0\n    {{")?;
    writeln!(out, "        bgcolor = \"#ffAAAA\";")?;
    writeln!(out, "        style   = filled;")?;
    writeln!(out, "        label   = \"syntax tree\";")?;
    writeln!(out)?;

    let mut visited = vec![false; tree.nodes.len()];
    let mut stack: Vec<NodeId> = tree.root().into_iter().collect();
    while let Some(id) = stack.pop() {
        let Some(node) = tree.get(id) else { continue };
        if std::mem::replace(&mut visited[id.index()], true) {
            continue;
        }
        let color = if node.kind == NodeKind::NoType {
            "#FF0000"
        } else {
            "#0000FF"
        };
        writeln!(
            out,
            "        {}  [shape = \"Mrecord\", fillcolor = \"#FFFFFF\", label = \"{}\", color = \"{color}\"];",
            id.index(),
            escape(&label(tree, node.kind)),
        )?;
        for child in node.children() {
            writeln!(
                out,
                "        {} -> {} [color = \"#FF0000\", weight = 10];",
                id.index(),
                child.index()
            )?;
        }
        stack.extend(node.right);
        stack.extend(node.left);
    }

    writeln!(out, "    }}\n}}")
}

/// Write `dot_path` and rasterise it into `png_path` with `dot -Tpng`.
pub fn render_png(tree: &Tree, dot_path: &Path, png_path: &Path) -> Result<(), ImageError> {
    let mut file = BufWriter::new(File::create(dot_path)?);
    write_dot(tree, &mut file)?;
    file.flush()?;

    debug!(dot = %dot_path.display(), png = %png_path.display(), "running dot");
    let status = Command::new("dot")
        .arg("-Tpng")
        .arg("-o")
        .arg(png_path)
        .arg(dot_path)
        .status()
        .map_err(ImageError::Spawn)?;
    if !status.success() {
        return Err(ImageError::Layout(status));
    }
    Ok(())
}
