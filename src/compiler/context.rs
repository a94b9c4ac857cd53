use core::fmt::{self, Write};

/// Per-compilation state of the code generator: label counters and the output buffer.
///
/// `if` and `while` sites are numbered independently, each starting at 0, in the
/// order the generator reaches them.
#[derive(Debug, Default)]
pub struct CodegenContext {
    next_if: usize,
    next_while: usize,
    lines: usize,
    out: String,
}

impl CodegenContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_if(&mut self) -> usize {
        let label = self.next_if;
        self.next_if += 1;
        label
    }

    pub fn fresh_while(&mut self) -> usize {
        let label = self.next_while;
        self.next_while += 1;
        label
    }

    /// Emit one indented instruction.
    pub fn instr(&mut self, args: fmt::Arguments<'_>) {
        self.line("    ", args);
    }

    /// Emit a label in column 0.
    pub fn label(&mut self, args: fmt::Arguments<'_>) {
        self.line("", args);
    }

    fn line(&mut self, indent: &str, args: fmt::Arguments<'_>) {
        self.out.push_str(indent);
        // writing into a String cannot fail
        let _ = self.out.write_fmt(args);
        self.out.push('\n');
        self.lines += 1;
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn finish(self) -> String {
        self.out
    }
}
