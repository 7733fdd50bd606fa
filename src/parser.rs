use crate::{
    error::{LispError, LispResult},
    syntax::{combine_with_space, List, Symbol, Value},
};

use self::tokens::{tokenize, Token};

pub mod tokens {
    use std::ops::Range;

    use winnow::{combinator::alt, token::take_while, PResult, Parser};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Token {
        Open,
        Close,
        Quote,
        Atom(String),
    }

    pub type TokenSpan = (Token, Range<usize>);

    pub(crate) fn is_atom_char(c: char) -> bool {
        c.is_ascii_uppercase() || c.is_ascii_digit() || "+-*/<>=.?!@%:#$,&|_\\".contains(c)
    }

    fn token(input: &mut &str) -> PResult<Token> {
        alt((
            '('.value(Token::Open),
            ')'.value(Token::Close),
            '\''.value(Token::Quote),
            take_while(1.., is_atom_char).map(|s: &str| Token::Atom(s.to_string())),
        ))
        .parse_next(input)
    }

    /// Tokenizes as much of the input as possible, recording byte spans.
    /// Characters outside the token alphabet are skipped.
    pub fn spans(input: &str) -> Vec<TokenSpan> {
        let mut rest = input;
        let mut offset = 0;
        let mut found = Vec::new();
        while !rest.is_empty() {
            let before = rest.len();
            match token(&mut rest) {
                Ok(token) => {
                    let end = offset + (before - rest.len());
                    found.push((token, offset..end));
                    offset = end;
                }
                Err(_) => {
                    let mut chars = rest.chars();
                    chars.next();
                    offset += before - chars.as_str().len();
                    rest = chars.as_str();
                }
            }
        }
        found
    }

    pub fn tokenize(input: &str) -> Vec<Token> {
        spans(input).into_iter().map(|(token, _)| token).collect()
    }
}

/// Reads every complete top-level value out of the buffer, leaving any
/// trailing partial form behind for the next read. Quote macros are
/// expanded textually and input is upper-cased before tokenizing.
pub fn process_buffer(buffer: &mut String) -> LispResult<Vec<Value>> {
    let expanded = expand_quote_macro(buffer).to_ascii_uppercase();
    let mut values = Vec::new();
    let mut depth = 0usize;
    let mut list_text = String::new();
    for token in tokenize(&expanded) {
        match token {
            Token::Open => {
                depth += 1;
                list_text = combine_with_space(&list_text, "(");
            }
            Token::Close => {
                if depth == 0 {
                    return Err(LispError::UnexpectedListClosure);
                }
                list_text = combine_with_space(&list_text, ")");
                depth -= 1;
                if depth == 0 {
                    values.push(Value::List(parse_list(&list_text)?));
                    list_text.clear();
                }
            }
            Token::Quote => {
                if depth == 0 {
                    values.push(Value::Symbol(Symbol::new("'".to_string())));
                } else {
                    list_text = combine_with_space(&list_text, "'");
                }
            }
            Token::Atom(text) => {
                if depth == 0 {
                    values.push(parse_atom(&text));
                } else {
                    list_text = combine_with_space(&list_text, &text);
                }
            }
        }
    }
    *buffer = list_text;
    Ok(values)
}

fn parse_atom(text: &str) -> Value {
    if text == "NIL" {
        Value::nil()
    } else if is_numeric_token(text) {
        match text.parse() {
            Ok(number) => Value::Number(number),
            Err(_) => Value::Symbol(Symbol::new(text.to_string())),
        }
    } else {
        Value::Symbol(Symbol::new(text.to_string()))
    }
}

/// Reparses the accumulated text of a single parenthesized form into a
/// list, recursing through `process_buffer` for the items.
fn parse_list(source: &str) -> LispResult<List> {
    let mut inner = source
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(source)
        .to_string();
    let items = process_buffer(&mut inner)?;
    List::from_items(items)
}

/// An optional sign, digits with at most one `.`, ending in a digit.
/// `.5` is numeric; a bare `.` or a trailing `.` stays symbolic.
pub(crate) fn is_numeric_token(s: &str) -> bool {
    let rest = s.strip_prefix('-').unwrap_or(s);
    let (whole, frac) = match rest.split_once('.') {
        Some((whole, frac)) => (whole, Some(frac)),
        None => (rest, None),
    };
    let digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    rest.ends_with(|c: char| c.is_ascii_digit()) && digits(whole) && frac.map_or(true, digits)
}

/// Rewrites every `'FORM` in the text to `(QUOTE FORM)`. The scan after a
/// quote walks one token or one balanced parenthesized group; a trailing
/// quote with nothing after it is left in place to wait for more input.
pub(crate) fn expand_quote_macro(input: &str) -> String {
    let mut chars: Vec<char> = input.chars().collect();
    while let Some(target) = chars.iter().position(|&c| c == '\'') {
        let mut depth = 0;
        let mut word_started = false;
        let mut i = target + 1;
        while i < chars.len() {
            let c = chars[i];
            if c == '(' {
                depth += 1;
            } else if depth == 0 {
                if word_started && (c == ' ' || c == ')') {
                    break;
                }
                word_started = true;
            } else if c == ')' {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            i += 1;
        }
        if i == chars.len() && !word_started {
            break;
        }
        chars.insert(i, ')');
        chars.remove(target);
        for (offset, c) in "(QUOTE ".chars().enumerate() {
            chars.insert(target + offset, c);
        }
    }
    chars.into_iter().collect()
}

#[cfg(test)]
fn parse_all(source: &str) -> LispResult<Vec<Value>> {
    let mut buffer = source.to_string();
    let values = process_buffer(&mut buffer)?;
    assert_eq!(buffer, "");
    Ok(values)
}

#[test]
fn test_quote_macro() {
    assert_eq!(expand_quote_macro("'X"), "(QUOTE X)");
    assert_eq!(expand_quote_macro("'(1 2 3)"), "(QUOTE (1 2 3))");
    assert_eq!(expand_quote_macro("''A"), "(QUOTE (QUOTE A))");
    assert_eq!(expand_quote_macro("(A 'B C)"), "(A (QUOTE B) C)");
    assert_eq!(expand_quote_macro("'(A (B C))"), "(QUOTE (A (B C)))");
    // Nothing after the quote yet; leave it for the next read.
    assert_eq!(expand_quote_macro("'"), "'");
}

#[test]
fn test_simple_forms() {
    let values = parse_all("(+ 1 2) X 5 NIL").unwrap();
    let printed: Vec<String> = values.iter().map(Value::to_string).collect();
    assert_eq!(printed, ["(+ 1 2)", "X", "5", "NIL"]);
    assert!(matches!(values[2], Value::Number(_)));
    assert!(!values[3].is_truthy());
}

#[test]
fn test_quoted_forms() {
    let values = parse_all("'(1 2 3) 'x").unwrap();
    let printed: Vec<String> = values.iter().map(Value::to_string).collect();
    assert_eq!(printed, ["(QUOTE (1 2 3))", "(QUOTE X)"]);
}

#[test]
fn test_partial_buffer() {
    let mut buffer = "(+ 1 2) (+ 3".to_string();
    let values = process_buffer(&mut buffer).unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].to_string(), "(+ 1 2)");
    assert_eq!(buffer, "(+ 3");

    buffer.push_str(" 4)");
    let values = process_buffer(&mut buffer).unwrap();
    assert_eq!(values[0].to_string(), "(+ 3 4)");
    assert_eq!(buffer, "");
}

#[test]
fn test_dotted_pair() {
    let values = parse_all("(A . B)").unwrap();
    assert_eq!(values[0].to_string(), "(A . B)");
    assert!(matches!(
        parse_all("(A . . B)"),
        Err(LispError::InvalidListEnding(_))
    ));
}

#[test]
fn test_unexpected_closure() {
    assert!(matches!(
        parse_all(")"),
        Err(LispError::UnexpectedListClosure)
    ));
    assert!(matches!(
        parse_all("(A))"),
        Err(LispError::UnexpectedListClosure)
    ));
}

#[test]
fn test_case_folding_and_junk() {
    let values = parse_all("(car ~ lst)").unwrap();
    assert_eq!(values[0].to_string(), "(CAR LST)");
}

#[test]
fn test_numeric_tokens() {
    assert!(is_numeric_token("42"));
    assert!(is_numeric_token("-42"));
    assert!(is_numeric_token("1.5"));
    assert!(is_numeric_token("007"));
    assert!(is_numeric_token(".5"));
    assert!(is_numeric_token("-.5"));
    assert!(!is_numeric_token("."));
    assert!(!is_numeric_token("1."));
    assert!(!is_numeric_token("1+"));
    assert!(!is_numeric_token("-"));
    assert!(!is_numeric_token("1.2.3"));
}

#[test]
fn test_leading_dot_literal() {
    let values = parse_all(".5 -.5").unwrap();
    assert!(matches!(values[0], Value::Number(_)));
    assert_eq!(values[0].to_string(), "0.5");
    assert_eq!(values[1].to_string(), "-0.5");
}
