use std::borrow::Cow;

use colored::Colorize;
use rustyline::{highlight::Highlighter, history::DefaultHistory, validate::Validator, Completer, Editor, Helper, Hinter};

use crate::{
    functions::BUILTINS,
    parser::{
        self,
        tokens::{spans, Token},
    },
};

pub type Repl = Editor<LispHelper, DefaultHistory>;

#[derive(Helper, Completer, Hinter)]
pub struct LispHelper;

impl Validator for LispHelper {}

impl Highlighter for LispHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        // Tokens match against the upper-cased line; spans are byte
        // offsets, which ASCII case folding preserves.
        let upper = line.to_ascii_uppercase();
        let mut highlighted = String::new();
        let mut last = 0;
        for (token, span) in spans(&upper) {
            highlighted.push_str(&line[last..span.start]);
            highlighted.push_str(&highlight_token(&token, &line[span.clone()]));
            last = span.end;
        }
        highlighted.push_str(&line[last..]);
        Cow::Owned(highlighted)
    }

    fn highlight_char(&self, line: &str, _pos: usize, _forced: bool) -> bool {
        !line.is_empty()
    }
}

fn highlight_token(token: &Token, source: &str) -> String {
    match token {
        Token::Open | Token::Close => source.to_string(),
        Token::Quote => source.bright_blue().to_string(),
        Token::Atom(text) if parser::is_numeric_token(text) => source.yellow().to_string(),
        Token::Atom(text) if text == "T" || text == "NIL" => source.red().to_string(),
        Token::Atom(text) if BUILTINS.contains_key(text.as_str()) => source.magenta().to_string(),
        Token::Atom(_) => source.blue().to_string(),
    }
}
