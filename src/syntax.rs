use std::{
    collections::HashMap,
    fmt::{self, Display},
};

use itertools::Itertools;

use crate::{
    error::{LispError, LispResult},
    number::Number,
};

#[derive(Debug, Clone)]
pub enum Value {
    List(List),
    Symbol(Symbol),
    Number(Number),
}

impl Value {
    /// The empty list, which doubles as the false value. Always literal.
    pub fn nil() -> Value {
        Value::List(List {
            items: Vec::new(),
            dotted: false,
            literal: true,
        })
    }

    pub fn is_atom(&self) -> bool {
        match self {
            Value::List(list) => list.items.is_empty(),
            Value::Symbol(_) | Value::Number(_) => true,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// Everything is truthy except the empty list.
    pub fn is_truthy(&self) -> bool {
        !(self.is_atom() && self.is_list())
    }

    pub fn is_literal(&self) -> bool {
        match self {
            Value::List(list) => list.literal,
            Value::Symbol(symbol) => symbol.literal,
            Value::Number(_) => true,
        }
    }

    /// Freezes or thaws the whole value recursively. The symbol T and the
    /// empty list never thaw.
    pub fn set_literal(&mut self, literal: bool) {
        match self {
            Value::List(list) => list.set_literal(literal),
            Value::Symbol(symbol) => symbol.set_literal(literal),
            Value::Number(_) => {}
        }
    }

    pub fn into_list(self) -> LispResult<List> {
        match self {
            Value::List(list) => Ok(list),
            value => Err(LispError::NotAList(value.to_string())),
        }
    }

    pub fn into_number(self) -> LispResult<Number> {
        match self {
            Value::Number(number) => Ok(number),
            value => Err(LispError::NotANumber(value.to_string())),
        }
    }

    pub fn into_symbol(self) -> LispResult<Symbol> {
        match self {
            Value::Symbol(symbol) => Ok(symbol),
            value => Err(LispError::NotASymbol(value.to_string())),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        if value {
            Value::Symbol(Symbol::new("T".to_string()))
        } else {
            Value::nil()
        }
    }
}

// Printed-form equality: two values are the same value exactly when they
// print the same.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for Value {}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::List(list) => list.fmt(f),
            Value::Symbol(symbol) => write!(f, "{}", symbol.name),
            Value::Number(number) => number.fmt(f),
        }
    }
}

#[derive(Debug, Clone)]
pub struct List {
    pub(crate) items: Vec<Value>,
    pub(crate) dotted: bool,
    pub(crate) literal: bool,
}

impl List {
    /// Builds a list from already-parsed items, detecting the dotted-pair
    /// marker. A single `.` symbol is only legal right before the last
    /// item; it is removed and the dotted flag set.
    pub fn from_items(items: Vec<Value>) -> LispResult<List> {
        let mut items = items;
        let dots = items
            .iter()
            .filter(|item| item.to_string() == ".")
            .count();
        let dotted = match dots {
            0 => false,
            1 if items.len() >= 2 && items[items.len() - 2].to_string() == "." => {
                items.remove(items.len() - 2);
                true
            }
            _ => {
                let last = items.last().map(Value::to_string).unwrap_or_default();
                return Err(LispError::InvalidListEnding(last));
            }
        };
        let literal = items.is_empty();
        Ok(List {
            items,
            dotted,
            literal,
        })
    }

    pub fn set_literal(&mut self, literal: bool) {
        // The empty list is always literal.
        self.literal = literal || self.items.is_empty();
        for item in &mut self.items {
            item.set_literal(literal);
        }
    }

    /// A sublist slice carrying this list's flags. Slicing a dotted list
    /// down to only its tail value is not a list.
    pub fn get_range(&self, start: usize, count: usize) -> LispResult<List> {
        if count == 1 && self.dotted && start + count == self.items.len() {
            let last = self.items.last().map(Value::to_string).unwrap_or_default();
            return Err(LispError::InvalidListEnding(last));
        }
        Ok(List {
            items: self.items[start..start + count].to_vec(),
            dotted: self.dotted && start + count == self.items.len(),
            literal: self.literal,
        })
    }

    /// Structural substitution: every symbol named in the map is swapped
    /// for its replacement. Quoted sublists are left verbatim, and unless
    /// `replace_literals` is set, so is anything frozen.
    pub fn replace(&self, map: &HashMap<String, Value>, replace_literals: bool) -> List {
        let items = self
            .items
            .iter()
            .map(|item| match item {
                Value::List(list) => {
                    let quoted = list
                        .items
                        .first()
                        .is_some_and(|first| first.to_string() == "QUOTE");
                    if (!replace_literals && list.literal) || quoted {
                        item.clone()
                    } else {
                        Value::List(list.replace(map, replace_literals))
                    }
                }
                Value::Symbol(symbol) => {
                    if (replace_literals || !symbol.literal) && map.contains_key(&symbol.name) {
                        map[&symbol.name].clone()
                    } else {
                        item.clone()
                    }
                }
                Value::Number(_) => item.clone(),
            })
            .collect();
        List {
            items,
            dotted: self.dotted,
            literal: self.literal,
        }
    }
}

impl Display for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.items.is_empty() {
            return write!(f, "NIL");
        }
        let text = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                if self.dotted && i == self.items.len() - 1 {
                    format!(". {item}")
                } else {
                    item.to_string()
                }
            })
            .join(" ");
        write!(f, "({text})")
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub(crate) name: String,
    pub(crate) literal: bool,
}

impl Symbol {
    /// T is self-evaluating and can never be thawed.
    pub fn new(name: String) -> Symbol {
        let literal = name == "T";
        Symbol { name, literal }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_literal(&mut self, literal: bool) {
        self.literal = literal || self.name == "T";
    }
}

/// Joins two chunks of source text, spacing them apart unless the boundary
/// already separates tokens.
pub(crate) fn combine_with_space(s1: &str, s2: &str) -> String {
    if s1.is_empty() || s1.ends_with('(') || s2.starts_with(')') {
        format!("{s1}{s2}")
    } else {
        format!("{s1} {s2}")
    }
}

#[cfg(test)]
fn sym(name: &str) -> Value {
    Value::Symbol(Symbol::new(name.to_string()))
}

#[test]
fn test_display() {
    let list = List::from_items(vec![sym("A"), sym("B"), sym("C")]).unwrap();
    assert_eq!(list.to_string(), "(A B C)");
    assert_eq!(Value::nil().to_string(), "NIL");

    let dotted = List::from_items(vec![sym("A"), sym("."), sym("B")]).unwrap();
    assert!(dotted.dotted);
    assert_eq!(dotted.to_string(), "(A . B)");
}

#[test]
fn test_bad_dots() {
    assert!(matches!(
        List::from_items(vec![sym("."), sym("A"), sym("B")]),
        Err(LispError::InvalidListEnding(_))
    ));
    assert!(matches!(
        List::from_items(vec![sym("A"), sym("."), sym("."), sym("B")]),
        Err(LispError::InvalidListEnding(_))
    ));
}

#[test]
fn test_truthiness() {
    assert!(!Value::nil().is_truthy());
    assert!(sym("X").is_truthy());
    assert!(Value::Number(Number::zero()).is_truthy());
    assert!(Value::from(true).is_truthy());
    assert!(!Value::from(false).is_truthy());
}

#[test]
fn test_literal_flags() {
    let mut t = sym("T");
    assert!(t.is_literal());
    t.set_literal(false);
    assert!(t.is_literal());

    let mut nil = Value::nil();
    nil.set_literal(false);
    assert!(nil.is_literal());

    let mut list = Value::List(
        List::from_items(vec![sym("A"), Value::List(
            List::from_items(vec![sym("B")]).unwrap(),
        )])
        .unwrap(),
    );
    list.set_literal(true);
    assert!(list.is_literal());
    let Value::List(outer) = &list else { unreachable!() };
    assert!(outer.items.iter().all(Value::is_literal));
}

#[test]
fn test_replace() {
    let map = HashMap::from([("X".to_string(), sym("Y"))]);
    let list = List::from_items(vec![
        sym("X"),
        Value::List(List::from_items(vec![sym("QUOTE"), sym("X")]).unwrap()),
        Value::List(List::from_items(vec![sym("X"), sym("Z")]).unwrap()),
    ])
    .unwrap();
    let replaced = list.replace(&map, false);
    assert_eq!(replaced.to_string(), "(Y (QUOTE X) (Y Z))");

    let mut frozen = list.clone();
    frozen.set_literal(true);
    assert_eq!(frozen.replace(&map, false).to_string(), frozen.to_string());
    assert_eq!(
        frozen.replace(&map, true).to_string(),
        "(Y (QUOTE X) (Y Z))"
    );
}

#[test]
fn test_get_range() {
    let dotted = List::from_items(vec![sym("A"), sym("B"), sym("."), sym("C")]).unwrap();
    let tail = dotted.get_range(1, 2).unwrap();
    assert_eq!(tail.to_string(), "(B . C)");
    assert!(matches!(
        dotted.get_range(2, 1),
        Err(LispError::InvalidListEnding(_))
    ));
}
