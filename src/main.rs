mod error;
mod functions;
mod interpreter;
mod number;
mod parser;
mod repl;
mod syntax;

use anyhow::Result;
use rustyline::error::ReadlineError;

use crate::{
    interpreter::Interpreter,
    repl::{LispHelper, Repl},
};

fn main() -> Result<()> {
    println!("lispet {}", env!("CARGO_PKG_VERSION"));
    let mut editor = Repl::new()?;
    editor.set_helper(Some(LispHelper));
    let mut interpreter = Interpreter::new();
    let mut count = 1;
    while interpreter.is_running() {
        match editor.readline(&format!("[{count}]> ")) {
            Ok(line) => {
                editor.add_history_entry(&line)?;
                interpreter.ingest(&line);
                let output = interpreter.drain_and_evaluate();
                if !output.is_empty() {
                    println!("{output}");
                }
                count += 1;
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(error) => return Err(error.into()),
        }
    }
    Ok(())
}
