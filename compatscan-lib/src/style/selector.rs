//! Selector parsing, matching and specificity for the built-in selector engine.
//!
//! The cascade only sees this module through the [`SelectorMatcher`] and
//! [`SpecificityComparator`] traits, so a real browser engine can be swapped in.

use crate::dom::ElementRef;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("invalid selector `{0}`")]
    Invalid(String),
    #[error("unsupported selector `{0}`")]
    Unsupported(String),
}

/// Decides whether a selector matches an element.
pub trait SelectorMatcher: Send + Sync {
    fn matches(&self, selector: &str, element: &ElementRef<'_>) -> Result<bool, SelectorError>;
}

/// Orders two selectors by specificity.
pub trait SpecificityComparator: Send + Sync {
    fn compare(&self, a: &str, b: &str) -> Result<Ordering, SelectorError>;
}

/// ------------------------------
/// 1. Selector Parsing
/// ------------------------------

/// Supported attribute selector operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeOperator {
    /// [attr="value"]
    Exact,
    /// [attr~="value"]
    Includes,
    /// [attr|="value"]
    DashMatch,
    /// [attr^="value"]
    Prefix,
    /// [attr$="value"]
    Suffix,
    /// [attr*="value"]
    Substring,
}

/// Represents one attribute condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSelector {
    pub name: String,
    pub operator: Option<AttributeOperator>, // None means only existence check
    pub value: Option<String>,
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudoClass {
    Root,
    FirstChild,
    LastChild,
    OnlyChild,
    FirstOfType,
    LastOfType,
    OnlyOfType,
    Empty,
    Checked,
    Disabled,
    Enabled,
    /// :hover, :focus and friends. A static tree is never in those states.
    Dynamic,
    /// `:nth-child(An+B [of S])`
    NthChild(Nth, Option<SelectorList>),
    /// `:nth-last-child(An+B [of S])`
    NthLastChild(Nth, Option<SelectorList>),
    NthOfType(Nth),
    NthLastOfType(Nth),
    Not(SelectorList),
    /// `:is()` and its legacy aliases.
    Is(SelectorList),
    /// Like `:is()` but without specificity.
    Where(SelectorList),
}

/// The `An+B` argument of the `:nth-*` pseudo-classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nth {
    pub a: i32,
    pub b: i32,
}

impl Nth {
    /// Parses `odd`, `even`, `3`, `n`, `-n+3`, `2n + 1` and the like.
    pub fn parse(argument: &str) -> Option<Nth> {
        let compact: String = argument
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        match compact.as_str() {
            "odd" => return Some(Nth { a: 2, b: 1 }),
            "even" => return Some(Nth { a: 2, b: 0 }),
            "" => return None,
            _ => {}
        }
        let Some((a, b)) = compact.split_once('n') else {
            return compact.parse().ok().map(|b| Nth { a: 0, b });
        };
        let a = match a {
            "" | "+" => 1,
            "-" => -1,
            a => a.parse().ok()?,
        };
        let b = match b {
            "" => 0,
            b if b.starts_with(['+', '-']) => b.parse().ok()?,
            _ => return None,
        };
        Some(Nth { a, b })
    }

    /// Whether the 1-based `position` is `a*n + b` for some `n >= 0`.
    pub fn matches(&self, position: i32) -> bool {
        if self.a == 0 {
            return position == self.b;
        }
        let offset = position - self.b;
        offset % self.a == 0 && offset / self.a >= 0
    }
}

impl PseudoClass {
    fn from_name(name: &str) -> Option<Self> {
        let pseudo = match name.to_ascii_lowercase().as_str() {
            // In a stylesheet, `:scope` is the root element.
            "root" | "scope" => PseudoClass::Root,
            "first-child" => PseudoClass::FirstChild,
            "last-child" => PseudoClass::LastChild,
            "only-child" => PseudoClass::OnlyChild,
            "first-of-type" => PseudoClass::FirstOfType,
            "last-of-type" => PseudoClass::LastOfType,
            "only-of-type" => PseudoClass::OnlyOfType,
            "empty" => PseudoClass::Empty,
            "checked" => PseudoClass::Checked,
            "disabled" => PseudoClass::Disabled,
            "enabled" => PseudoClass::Enabled,
            "hover" | "focus" | "active" | "visited" | "link" | "any-link" | "focus-within"
            | "focus-visible" | "target" => PseudoClass::Dynamic,
            _ => return None,
        };
        Some(pseudo)
    }

    /// Functional pseudo-classes; `argument` is the text between the parentheses.
    fn from_function(name: &str, argument: &str, whole: &str) -> Result<Self, SelectorError> {
        let invalid = || SelectorError::Invalid(whole.to_string());
        // Errors inside the argument are reported against the whole selector.
        let nested = |list: &str| {
            parse_selector_list(list).map_err(|err| match err {
                SelectorError::Invalid(_) => SelectorError::Invalid(whole.to_string()),
                SelectorError::Unsupported(_) => SelectorError::Unsupported(whole.to_string()),
            })
        };
        let nth_of = |argument: &str| -> Result<(Nth, Option<SelectorList>), SelectorError> {
            match argument.split_once(" of ") {
                Some((nth, of)) => Ok((Nth::parse(nth).ok_or_else(invalid)?, Some(nested(of)?))),
                None => Ok((Nth::parse(argument).ok_or_else(invalid)?, None)),
            }
        };

        let pseudo = match name.to_ascii_lowercase().as_str() {
            "not" => PseudoClass::Not(nested(argument)?),
            "is" | "matches" | "-webkit-any" | "-moz-any" => PseudoClass::Is(nested(argument)?),
            "where" => PseudoClass::Where(nested(argument)?),
            "nth-child" => {
                let (nth, of) = nth_of(argument)?;
                PseudoClass::NthChild(nth, of)
            }
            "nth-last-child" => {
                let (nth, of) = nth_of(argument)?;
                PseudoClass::NthLastChild(nth, of)
            }
            "nth-of-type" => PseudoClass::NthOfType(Nth::parse(argument).ok_or_else(invalid)?),
            "nth-last-of-type" => {
                PseudoClass::NthLastOfType(Nth::parse(argument).ok_or_else(invalid)?)
            }
            // :has(), :lang(), :dir(), :host() ...
            _ => return Err(SelectorError::Unsupported(whole.to_string())),
        };
        Ok(pseudo)
    }

    fn specificity(&self) -> Specificity {
        match self {
            PseudoClass::Not(list) | PseudoClass::Is(list) => list.specificity(),
            PseudoClass::Where(_) => Specificity::default(),
            PseudoClass::NthChild(_, Some(of)) | PseudoClass::NthLastChild(_, Some(of)) => {
                Specificity(0, 1, 0) + of.specificity()
            }
            _ => Specificity(0, 1, 0),
        }
    }
}

/// Pseudo-elements that may be written with a single colon.
const LEGACY_PSEUDO_ELEMENTS: &[&str] = &["before", "after", "first-line", "first-letter"];

/// A compound selector: an optional tag plus id, classes, attributes and pseudo-classes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundSelector {
    pub tag: Option<String>,
    pub ids: Vec<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<AttributeSelector>,
    pub pseudo_classes: Vec<PseudoClass>,
    pub pseudo_element: Option<String>,
}

/// A complex selector composed of a key compound selector and a list of ancestor parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexSelector {
    pub key: CompoundSelector,
    /// Ancestors with their combinators, in right-to-left order.
    pub ancestors: Vec<(Combinator, CompoundSelector)>,
}

/// Supported combinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Descendant combinator (a space).
    Descendant,
    /// Child combinator (`>`).
    Child,
    /// Adjacent sibling combinator (`+`).
    AdjacentSibling,
    /// General sibling combinator (`~`).
    GeneralSibling,
}

/// A comma-separated list of complex selectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList(pub Vec<ComplexSelector>);

pub fn parse_selector_list(selector: &str) -> Result<SelectorList, SelectorError> {
    let parts = split_top_level(selector, ',');
    let mut list = Vec::with_capacity(parts.len());
    for part in parts {
        list.push(parse_complex_selector(part, selector)?);
    }
    Ok(SelectorList(list))
}

/// Splits on `delimiter` outside brackets, parentheses and quotes.
fn split_top_level(input: &str, delimiter: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut escaped = false;

    for (i, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, ch) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            (None, c) if c == delimiter && depth == 0 => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Parse one complex selector (e.g. "div.red > p#header + span.foo").
/// Combinators may be written with or without surrounding whitespace.
fn parse_complex_selector(selector: &str, whole: &str) -> Result<ComplexSelector, SelectorError> {
    let invalid = || SelectorError::Invalid(whole.to_string());

    let mut compounds: Vec<String> = Vec::new();
    let mut combinators: Vec<Combinator> = Vec::new();
    let mut buffer = String::new();
    let mut pending: Option<Combinator> = None;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut chars = selector.trim().chars();

    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            buffer.push(ch);
            if ch == '\\' {
                if let Some(next) = chars.next() {
                    buffer.push(next);
                }
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        if depth > 0 {
            buffer.push(ch);
            match ch {
                '"' | '\'' => quote = Some(ch),
                '[' | '(' => depth += 1,
                ']' | ')' => depth -= 1,
                _ => {}
            }
            continue;
        }
        match ch {
            '\\' => {
                buffer.push(ch);
                if let Some(next) = chars.next() {
                    buffer.push(next);
                }
            }
            '[' | '(' => {
                if let Some(combinator) = pending.take() {
                    combinators.push(combinator);
                }
                depth += 1;
                buffer.push(ch);
            }
            c if c.is_whitespace() || c == '>' || c == '+' || c == '~' => {
                if !buffer.is_empty() {
                    compounds.push(std::mem::take(&mut buffer));
                    pending = Some(Combinator::Descendant);
                }
                let explicit = match c {
                    '>' => Some(Combinator::Child),
                    '+' => Some(Combinator::AdjacentSibling),
                    '~' => Some(Combinator::GeneralSibling),
                    _ => None,
                };
                if let Some(combinator) = explicit {
                    match pending {
                        // Two explicit combinators in a row, or one leading the selector.
                        None if compounds.is_empty() => return Err(invalid()),
                        Some(Combinator::Descendant) => pending = Some(combinator),
                        Some(_) | None => return Err(invalid()),
                    }
                }
            }
            _ => {
                if let Some(combinator) = pending.take() {
                    combinators.push(combinator);
                }
                buffer.push(ch);
            }
        }
    }

    if depth > 0 || quote.is_some() {
        return Err(invalid());
    }
    if !buffer.is_empty() {
        compounds.push(buffer);
    } else if matches!(pending, Some(c) if c != Combinator::Descendant) {
        // Trailing explicit combinator.
        return Err(invalid());
    }
    if compounds.is_empty() || combinators.len() + 1 != compounds.len() {
        return Err(invalid());
    }

    let mut parsed = compounds
        .iter()
        .map(|compound| parse_compound_selector(compound, whole))
        .collect::<Result<Vec<_>, _>>()?;

    // Pseudo-elements are only valid on the rightmost compound.
    if parsed[..parsed.len() - 1]
        .iter()
        .any(|compound| compound.pseudo_element.is_some())
    {
        return Err(invalid());
    }

    let key = parsed.pop().ok_or_else(invalid)?;
    let ancestors = combinators.into_iter().rev().zip(parsed.into_iter().rev()).collect();
    Ok(ComplexSelector { key, ancestors })
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '-' || ch == '_' || !ch.is_ascii()
}

fn read_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&ch) = chars.peek() {
        if ch == '\\' {
            chars.next();
            if let Some(escaped) = chars.next() {
                ident.push(escaped);
            }
        } else if is_ident_char(ch) {
            ident.push(ch);
            chars.next();
        } else {
            break;
        }
    }
    ident
}

fn skip_whitespace(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while chars.peek().is_some_and(|ch| ch.is_whitespace()) {
        chars.next();
    }
}

/// Parse a compound selector string, e.g. "div.red#header[disabled][data-type~=\"main\"]:first-child"
pub fn parse_compound_selector(
    selector: &str,
    whole: &str,
) -> Result<CompoundSelector, SelectorError> {
    let invalid = || SelectorError::Invalid(whole.to_string());
    let unsupported = || SelectorError::Unsupported(whole.to_string());

    let mut compound = CompoundSelector::default();
    let mut chars = selector.chars().peekable();

    // A leading identifier or '*' is the type selector.
    if chars.peek() == Some(&'*') {
        chars.next();
    } else if chars.peek().is_some_and(|&ch| is_ident_char(ch) || ch == '\\') {
        compound.tag = Some(read_ident(&mut chars).to_ascii_lowercase());
    }

    while let Some(ch) = chars.next() {
        if compound.pseudo_element.is_some() {
            // Nothing may follow a pseudo-element in the subset supported here.
            return Err(unsupported());
        }
        match ch {
            '#' => {
                let id = read_ident(&mut chars);
                if id.is_empty() {
                    return Err(invalid());
                }
                compound.ids.push(id);
            }
            '.' => {
                let class = read_ident(&mut chars);
                if class.is_empty() {
                    return Err(invalid());
                }
                compound.classes.push(class);
            }
            '[' => compound
                .attributes
                .push(parse_attribute_selector(&mut chars).ok_or_else(invalid)?),
            ':' => {
                let double = chars.peek() == Some(&':');
                if double {
                    chars.next();
                }
                let name = read_ident(&mut chars);
                if name.is_empty() {
                    return Err(invalid());
                }
                let lowered = name.to_ascii_lowercase();
                if chars.peek() == Some(&'(') {
                    chars.next();
                    let argument = read_argument(&mut chars).ok_or_else(invalid)?;
                    if double {
                        // ::part(), ::slotted() and friends.
                        compound.pseudo_element = Some(lowered);
                    } else {
                        compound
                            .pseudo_classes
                            .push(PseudoClass::from_function(&lowered, &argument, whole)?);
                    }
                } else if double || LEGACY_PSEUDO_ELEMENTS.contains(&lowered.as_str()) {
                    compound.pseudo_element = Some(lowered);
                } else {
                    compound
                        .pseudo_classes
                        .push(PseudoClass::from_name(&lowered).ok_or_else(unsupported)?);
                }
            }
            _ => return Err(invalid()),
        }
    }

    Ok(compound)
}

/// Reads up to the `)` closing an already consumed `(`, honouring nesting and quotes.
fn read_argument(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<String> {
    let mut argument = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    loop {
        let ch = chars.next()?;
        match (quote, ch) {
            (_, '\\') => {
                argument.push(ch);
                argument.push(chars.next()?);
                continue;
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(' | '[') => depth += 1,
            (None, ')') if depth == 0 => return Some(argument.trim().to_string()),
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            _ => {}
        }
        argument.push(ch);
    }
}

/// Parses the inside of `[...]`; the opening bracket is already consumed.
fn parse_attribute_selector(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Option<AttributeSelector> {
    skip_whitespace(chars);
    let name = read_ident(chars).to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    skip_whitespace(chars);

    let operator = match chars.next()? {
        ']' => {
            return Some(AttributeSelector {
                name,
                operator: None,
                value: None,
                case_insensitive: false,
            })
        }
        '=' => AttributeOperator::Exact,
        op @ ('~' | '|' | '^' | '$' | '*') => {
            if chars.next()? != '=' {
                return None;
            }
            match op {
                '~' => AttributeOperator::Includes,
                '|' => AttributeOperator::DashMatch,
                '^' => AttributeOperator::Prefix,
                '$' => AttributeOperator::Suffix,
                _ => AttributeOperator::Substring,
            }
        }
        _ => return None,
    };

    skip_whitespace(chars);
    let value = match chars.peek().copied()? {
        q @ ('"' | '\'') => {
            chars.next();
            let mut value = String::new();
            loop {
                match chars.next()? {
                    '\\' => value.push(chars.next()?),
                    ch if ch == q => break,
                    ch => value.push(ch),
                }
            }
            value
        }
        _ => {
            let value = read_ident(chars);
            if value.is_empty() {
                return None;
            }
            value
        }
    };

    skip_whitespace(chars);
    let mut case_insensitive = false;
    if chars.peek().is_some_and(|ch| ch.eq_ignore_ascii_case(&'i')) {
        chars.next();
        case_insensitive = true;
        skip_whitespace(chars);
    } else if chars.peek().is_some_and(|ch| ch.eq_ignore_ascii_case(&'s')) {
        chars.next();
        skip_whitespace(chars);
    }
    if chars.next()? != ']' {
        return None;
    }

    Some(AttributeSelector {
        name,
        operator: Some(operator),
        value: Some(value),
        case_insensitive,
    })
}

/// ------------------------------
/// 2. Specificity
/// ------------------------------

/// (id_count, class+attribute+pseudo-class count, type+pseudo-element count)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity(pub u32, pub u32, pub u32);

impl std::ops::Add for Specificity {
    type Output = Specificity;

    fn add(self, other: Specificity) -> Specificity {
        Specificity(self.0 + other.0, self.1 + other.1, self.2 + other.2)
    }
}

pub fn compute_specificity(compound: &CompoundSelector) -> Specificity {
    let id_count = compound.ids.len() as u32;
    let class_count = (compound.classes.len() + compound.attributes.len()) as u32;
    let tag_count =
        u32::from(compound.tag.is_some()) + u32::from(compound.pseudo_element.is_some());
    compound
        .pseudo_classes
        .iter()
        .map(PseudoClass::specificity)
        .fold(Specificity(id_count, class_count, tag_count), |total, pseudo| {
            total + pseudo
        })
}

/// Compute specificity for a complex selector by summing key and ancestors.
pub fn compute_complex_specificity(selector: &ComplexSelector) -> Specificity {
    selector
        .ancestors
        .iter()
        .fold(compute_specificity(&selector.key), |spec, (_, compound)| {
            spec + compute_specificity(compound)
        })
}

impl SelectorList {
    /// A list weighs as much as its most specific member.
    pub fn specificity(&self) -> Specificity {
        self.0
            .iter()
            .map(compute_complex_specificity)
            .max()
            .unwrap_or_default()
    }

    pub fn matches(&self, element: &ElementRef<'_>) -> bool {
        self.0
            .iter()
            .any(|complex| matches_complex_selector(element, complex))
    }
}

/// ------------------------------
/// 3. Selector Matching
/// ------------------------------

fn eq_case(a: &str, b: &str, case_insensitive: bool) -> bool {
    if case_insensitive {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

fn matches_attribute(actual: &str, attr_sel: &AttributeSelector) -> bool {
    let (Some(operator), Some(expected)) = (&attr_sel.operator, &attr_sel.value) else {
        // No operator means just existence; already confirmed.
        return true;
    };
    let (actual, expected) = if attr_sel.case_insensitive {
        (actual.to_ascii_lowercase(), expected.to_ascii_lowercase())
    } else {
        (actual.to_string(), expected.clone())
    };
    match operator {
        AttributeOperator::Exact => actual == expected,
        AttributeOperator::Includes => actual.split_whitespace().any(|word| word == expected),
        AttributeOperator::DashMatch => {
            actual == expected || actual.starts_with(&format!("{}-", expected))
        }
        // An empty value never matches the substring operators.
        AttributeOperator::Prefix => !expected.is_empty() && actual.starts_with(&expected),
        AttributeOperator::Suffix => !expected.is_empty() && actual.ends_with(&expected),
        AttributeOperator::Substring => !expected.is_empty() && actual.contains(&expected),
    }
}

/// 1-based position among the siblings accepted by `counts`, from the start or the end.
fn sibling_position(
    element: &ElementRef<'_>,
    from_end: bool,
    counts: impl Fn(&ElementRef<'_>) -> bool,
) -> i32 {
    let before = if from_end {
        element.next_siblings().filter(|sibling| counts(sibling)).count()
    } else {
        element.prev_siblings().filter(|sibling| counts(sibling)).count()
    };
    before as i32 + 1
}

fn same_type(a: &ElementRef<'_>, b: &ElementRef<'_>) -> bool {
    a.node.tag.eq_ignore_ascii_case(&b.node.tag)
}

fn matches_nth_child(
    element: &ElementRef<'_>,
    nth: &Nth,
    of: Option<&SelectorList>,
    from_end: bool,
) -> bool {
    match of {
        Some(list) => {
            list.matches(element)
                && nth.matches(sibling_position(element, from_end, |s| list.matches(s)))
        }
        None => nth.matches(sibling_position(element, from_end, |_| true)),
    }
}

fn matches_pseudo_class(element: &ElementRef<'_>, pseudo: &PseudoClass) -> bool {
    let node = element.node;
    // Positional pseudo-classes need a parent.
    let positional = !element.is_root();
    match pseudo {
        PseudoClass::Root => element.is_root(),
        PseudoClass::FirstChild => positional && element.prev_sibling().is_none(),
        PseudoClass::LastChild => positional && element.next_sibling().is_none(),
        PseudoClass::OnlyChild => {
            positional && element.prev_sibling().is_none() && element.next_sibling().is_none()
        }
        PseudoClass::FirstOfType => {
            positional && !element.prev_siblings().any(|s| same_type(&s, element))
        }
        PseudoClass::LastOfType => {
            positional && !element.next_siblings().any(|s| same_type(&s, element))
        }
        PseudoClass::OnlyOfType => {
            positional
                && !element.prev_siblings().any(|s| same_type(&s, element))
                && !element.next_siblings().any(|s| same_type(&s, element))
        }
        PseudoClass::NthChild(nth, of) => {
            positional && matches_nth_child(element, nth, of.as_ref(), false)
        }
        PseudoClass::NthLastChild(nth, of) => {
            positional && matches_nth_child(element, nth, of.as_ref(), true)
        }
        PseudoClass::NthOfType(nth) => {
            positional && nth.matches(sibling_position(element, false, |s| same_type(s, element)))
        }
        PseudoClass::NthLastOfType(nth) => {
            positional && nth.matches(sibling_position(element, true, |s| same_type(s, element)))
        }
        PseudoClass::Not(list) => !list.matches(element),
        PseudoClass::Is(list) | PseudoClass::Where(list) => list.matches(element),
        // Text content is not part of the node shape; element children are all we know.
        PseudoClass::Empty => node.children.is_empty(),
        PseudoClass::Checked => {
            matches!(node.tag.as_str(), "input" | "option")
                && (node.attributes.contains_key("checked")
                    || node.attributes.contains_key("selected"))
        }
        PseudoClass::Disabled => is_form_control(&node.tag) && node.attributes.contains_key("disabled"),
        PseudoClass::Enabled => is_form_control(&node.tag) && !node.attributes.contains_key("disabled"),
        PseudoClass::Dynamic => false,
    }
}

fn is_form_control(tag: &str) -> bool {
    matches!(
        tag,
        "button" | "input" | "select" | "textarea" | "optgroup" | "option" | "fieldset"
    )
}

/// Returns true if the element matches the CompoundSelector.
/// Checks tag, id, classes, attribute conditions and pseudo-classes.
pub fn matches_compound(element: &ElementRef<'_>, compound: &CompoundSelector) -> bool {
    let elem = element.node;
    if compound.pseudo_element.is_some() {
        return false;
    }
    if let Some(ref tag) = compound.tag {
        if !elem.tag.eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if !compound.ids.is_empty() {
        match elem.attribute("id") {
            Some(elem_id) if compound.ids.iter().all(|id| id == elem_id) => {}
            _ => return false,
        }
    }
    if !compound.classes.is_empty() {
        let Some(class_attr) = elem.attribute("class") else {
            return false;
        };
        if !compound
            .classes
            .iter()
            .all(|class| class_attr.split_whitespace().any(|c| c == class))
        {
            return false;
        }
    }
    for attr_sel in &compound.attributes {
        let actual = elem
            .attributes
            .iter()
            .find(|(name, _)| eq_case(name, &attr_sel.name, true))
            .map(|(_, value)| value.as_str());
        match actual {
            Some(actual) if matches_attribute(actual, attr_sel) => {}
            _ => return false,
        }
    }
    compound
        .pseudo_classes
        .iter()
        .all(|pseudo| matches_pseudo_class(element, pseudo))
}

/// Matches a ComplexSelector against a candidate element, right to left.
pub fn matches_complex_selector(candidate: &ElementRef<'_>, complex: &ComplexSelector) -> bool {
    matches_compound(candidate, &complex.key) && matches_ancestors(candidate, &complex.ancestors)
}

/// Backtracks over descendant and general-sibling candidates so that
/// "div > p span" does not stop at the first `p` ancestor.
fn matches_ancestors(element: &ElementRef<'_>, rest: &[(Combinator, CompoundSelector)]) -> bool {
    let Some(((combinator, compound), rest)) = rest.split_first() else {
        return true;
    };
    let step = |next: ElementRef<'_>| matches_compound(&next, compound) && matches_ancestors(&next, rest);
    match combinator {
        Combinator::Child => element.parent().is_some_and(step),
        Combinator::Descendant => element.ancestors().any(step),
        Combinator::AdjacentSibling => element.prev_sibling().is_some_and(step),
        Combinator::GeneralSibling => element.prev_siblings().any(step),
    }
}

/// ------------------------------
/// 4. Built-in engine
/// ------------------------------

type ParsedSelector = Result<Arc<SelectorList>, SelectorError>;

/// Selector matcher and specificity comparator for the selector subset above.
///
/// Each distinct selector string is parsed once; the cascade asks about the
/// same rule selectors for every element.
#[derive(Debug, Default)]
pub struct BuiltinSelectors {
    parsed: RwLock<HashMap<String, ParsedSelector>>,
}

impl BuiltinSelectors {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(&self, selector: &str) -> ParsedSelector {
        if let Some(cached) = self.parsed.read().get(selector) {
            return cached.clone();
        }
        let parsed = parse_selector_list(selector).map(Arc::new);
        self.parsed
            .write()
            .insert(selector.to_string(), parsed.clone());
        parsed
    }

    /// Number of distinct selectors parsed so far.
    pub fn cached_len(&self) -> usize {
        self.parsed.read().len()
    }
}

impl SelectorMatcher for BuiltinSelectors {
    fn matches(&self, selector: &str, element: &ElementRef<'_>) -> Result<bool, SelectorError> {
        Ok(self.parse(selector)?.matches(element))
    }
}

impl SpecificityComparator for BuiltinSelectors {
    fn compare(&self, a: &str, b: &str) -> Result<Ordering, SelectorError> {
        let spec_a = self.parse(a)?.specificity();
        let spec_b = self.parse(b)?.specificity();
        Ok(spec_a.cmp(&spec_b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodeShape;

    fn page() -> NodeShape {
        NodeShape::new("html").with_child(
            NodeShape::new("body").with_child(
                NodeShape::new("div")
                    .with_attribute("class", "red wide")
                    .with_attribute("id", "main")
                    .with_child(NodeShape::new("h1").with_attribute("lang", "en-US"))
                    .with_child(
                        NodeShape::new("p")
                            .with_child(NodeShape::new("span").with_attribute("data-kind", "Note")),
                    )
                    .with_child(NodeShape::new("input").with_attribute("disabled", "")),
            ),
        )
    }

    fn matches(selector: &str, path: &[usize]) -> Result<bool, SelectorError> {
        let tree = page();
        fn walk(
            cursor: &ElementRef<'_>,
            path: &[usize],
            selector: &str,
        ) -> Result<bool, SelectorError> {
            match path.split_first() {
                None => BuiltinSelectors::new().matches(selector, cursor),
                Some((&index, rest)) => {
                    let child = ElementRef::child(cursor, index).unwrap();
                    walk(&child, rest, selector)
                }
            }
        }
        walk(&ElementRef::root(&tree), path, selector)
    }

    const DIV: &[usize] = &[0, 0];
    const H1: &[usize] = &[0, 0, 0];
    const P: &[usize] = &[0, 0, 1];
    const SPAN: &[usize] = &[0, 0, 1, 0];
    const INPUT: &[usize] = &[0, 0, 2];

    #[test]
    fn test_simple_selectors() {
        assert_eq!(matches("div", DIV), Ok(true));
        assert_eq!(matches("DIV", DIV), Ok(true));
        assert_eq!(matches("*", DIV), Ok(true));
        assert_eq!(matches(".red", DIV), Ok(true));
        assert_eq!(matches(".red.wide#main", DIV), Ok(true));
        assert_eq!(matches(".blue", DIV), Ok(false));
        assert_eq!(matches("#other", DIV), Ok(false));
        assert_eq!(matches("p", DIV), Ok(false));
    }

    #[test]
    fn test_combinators() {
        assert_eq!(matches("div > p > span", SPAN), Ok(true));
        assert_eq!(matches("div>p>span", SPAN), Ok(true));
        assert_eq!(matches("body span", SPAN), Ok(true));
        assert_eq!(matches("div > span", SPAN), Ok(false));
        assert_eq!(matches("h1 + p", P), Ok(true));
        assert_eq!(matches("h1 ~ input", INPUT), Ok(true));
        assert_eq!(matches("h1 + input", INPUT), Ok(false));
        assert_eq!(matches("html body .red p span", SPAN), Ok(true));
    }

    #[test]
    fn test_descendant_backtracking() {
        // The nearest `div` ancestor is not a child of `html`, but matching must not give up there.
        assert_eq!(matches("body > div span", SPAN), Ok(true));
        assert_eq!(matches("html > div span", SPAN), Ok(false));
    }

    #[test]
    fn test_attribute_selectors() {
        assert_eq!(matches("[lang]", H1), Ok(true));
        assert_eq!(matches("[lang|=en]", H1), Ok(true));
        assert_eq!(matches("[lang^='en']", H1), Ok(true));
        assert_eq!(matches("[lang$=\"US\"]", H1), Ok(true));
        assert_eq!(matches("[lang*=\"-\"]", H1), Ok(true));
        assert_eq!(matches("[lang=fr]", H1), Ok(false));
        assert_eq!(matches("[data-kind=note]", SPAN), Ok(false));
        assert_eq!(matches("[data-kind=note i]", SPAN), Ok(true));
        assert_eq!(matches("[class~=wide]", DIV), Ok(true));
    }

    #[test]
    fn test_pseudo_classes() {
        assert_eq!(matches(":root", &[]), Ok(true));
        assert_eq!(matches(":root", DIV), Ok(false));
        assert_eq!(matches("h1:first-child", H1), Ok(true));
        assert_eq!(matches("input:last-child", INPUT), Ok(true));
        assert_eq!(matches("div:only-child", DIV), Ok(true));
        assert_eq!(matches("span:empty", SPAN), Ok(true));
        assert_eq!(matches("input:disabled", INPUT), Ok(true));
        assert_eq!(matches("input:enabled", INPUT), Ok(false));
        assert_eq!(matches("div:hover", DIV), Ok(false));
        assert_eq!(matches("p::before", P), Ok(false));
        assert_eq!(matches("p:after", P), Ok(false));
    }

    #[test]
    fn test_selector_lists() {
        assert_eq!(matches("h2, p", P), Ok(true));
        assert_eq!(matches("h2, [data-x='a,b']", P), Ok(false));
    }

    #[test]
    fn test_invalid_and_unsupported() {
        assert!(matches!(matches("p:has(.x)", P), Err(SelectorError::Unsupported(_))));
        assert!(matches!(matches("p:not(:has(a))", P), Err(SelectorError::Unsupported(_))));
        assert!(matches!(matches("p:nth-child(x)", P), Err(SelectorError::Invalid(_))));
        assert!(matches!(matches("p:not(.x", P), Err(SelectorError::Invalid(_))));
        assert!(matches!(matches("p:made-up", P), Err(SelectorError::Unsupported(_))));
        assert!(matches!(matches("> p", P), Err(SelectorError::Invalid(_))));
        assert!(matches!(matches("div > > p", P), Err(SelectorError::Invalid(_))));
        assert!(matches!(matches("div >", P), Err(SelectorError::Invalid(_))));
        assert!(matches!(matches("p[lang", P), Err(SelectorError::Invalid(_))));
        assert!(matches!(matches("p,", P), Err(SelectorError::Invalid(_))));
        assert!(matches!(matches("p::before span", P), Err(SelectorError::Invalid(_))));
        assert!(matches!(matches("", P), Err(SelectorError::Invalid(_))));
    }

    #[test]
    fn test_specificity() {
        let spec = |s: &str| parse_selector_list(s).unwrap().specificity();
        assert_eq!(spec("*"), Specificity(0, 0, 0));
        assert_eq!(spec("div"), Specificity(0, 0, 1));
        assert_eq!(spec("div.red"), Specificity(0, 1, 1));
        assert_eq!(spec("#a .b:first-child [c] p::before"), Specificity(1, 3, 2));
        assert_eq!(spec("p, #x"), Specificity(1, 0, 0));
        assert_eq!(spec("form [disabled]"), Specificity(0, 1, 1));
        assert_eq!(spec("p:not(#a, .b)"), Specificity(1, 0, 1));
        assert_eq!(spec(":is(p, .b) span"), Specificity(0, 1, 1));
        assert_eq!(spec(":where(#a) p"), Specificity(0, 0, 1));
        assert_eq!(spec("li:nth-child(2n+1 of .x)"), Specificity(0, 2, 1));
        assert_eq!(spec("li:first-of-type"), Specificity(0, 1, 1));
    }

    #[test]
    fn test_compare() {
        let engine = BuiltinSelectors::new();
        assert_eq!(engine.compare("div", "#x"), Ok(Ordering::Less));
        assert_eq!(engine.compare(".a.b", ".c"), Ok(Ordering::Greater));
        assert_eq!(engine.compare("p", "span"), Ok(Ordering::Equal));
        assert_eq!(engine.compare(":where(#x) p", "p"), Ok(Ordering::Equal));
        assert!(engine.compare("p:has(a)", "p").is_err());
    }

    #[test]
    fn test_attribute_compound_after_combinator() {
        assert_eq!(matches("body [disabled]", INPUT), Ok(true));
        assert_eq!(matches("div > [disabled]", INPUT), Ok(true));
        assert_eq!(matches("h1 ~ [disabled]", INPUT), Ok(true));
        assert_eq!(matches("p > [disabled]", INPUT), Ok(false));
        assert_eq!(matches(".red [data-kind]", SPAN), Ok(true));
        assert_eq!(matches("div>[lang|=en]", H1), Ok(true));
    }

    #[test]
    fn test_of_type_pseudo_classes() {
        // Siblings under the div: h1, p, input.
        assert_eq!(matches("p:first-of-type", P), Ok(true));
        assert_eq!(matches("p:last-of-type", P), Ok(true));
        assert_eq!(matches("p:only-of-type", P), Ok(true));
        assert_eq!(matches("p:first-child", P), Ok(false));
        assert_eq!(matches("h1:last-of-type", H1), Ok(true));
        assert_eq!(matches(":root:first-of-type", &[]), Ok(false));
    }

    #[test]
    fn test_nth_pseudo_classes() {
        assert_eq!(matches("p:nth-child(2)", P), Ok(true));
        assert_eq!(matches("p:nth-child(even)", P), Ok(true));
        assert_eq!(matches("p:nth-child(odd)", P), Ok(false));
        assert_eq!(matches("input:nth-child(2n + 1)", INPUT), Ok(true));
        assert_eq!(matches("h1:nth-child(-n+1)", H1), Ok(true));
        assert_eq!(matches("input:nth-child(-n+2)", INPUT), Ok(false));
        assert_eq!(matches("input:nth-last-child(1)", INPUT), Ok(true));
        assert_eq!(matches("h1:nth-last-child(3)", H1), Ok(true));
        assert_eq!(matches("p:nth-of-type(1)", P), Ok(true));
        assert_eq!(matches("p:nth-last-of-type(n)", P), Ok(true));
        // Only the `[disabled]` sibling counts.
        assert_eq!(matches(":nth-child(1 of [disabled])", INPUT), Ok(true));
        assert_eq!(matches(":nth-child(1 of [disabled])", P), Ok(false));
    }

    #[test]
    fn test_logical_pseudo_classes() {
        assert_eq!(matches("p:not(.x)", P), Ok(true));
        assert_eq!(matches("div:not(#main)", DIV), Ok(false));
        assert_eq!(matches("div:not(.blue, .green)", DIV), Ok(true));
        assert_eq!(matches(":is(h1, p)", P), Ok(true));
        assert_eq!(matches(":is(h1, p)", INPUT), Ok(false));
        assert_eq!(matches(":where(div) > :is(p) span", SPAN), Ok(true));
        assert_eq!(matches("p:-webkit-any(p)", P), Ok(true));
        assert_eq!(matches(":scope", &[]), Ok(true));
    }

    #[test]
    fn test_nth_parse() {
        assert_eq!(Nth::parse("odd"), Some(Nth { a: 2, b: 1 }));
        assert_eq!(Nth::parse(" -n + 3 "), Some(Nth { a: -1, b: 3 }));
        assert_eq!(Nth::parse("+5"), Some(Nth { a: 0, b: 5 }));
        assert_eq!(Nth::parse("3n"), Some(Nth { a: 3, b: 0 }));
        assert_eq!(Nth::parse("2n1"), None);
        assert_eq!(Nth::parse(""), None);
        assert!(Nth { a: -1, b: 3 }.matches(3));
        assert!(!Nth { a: -1, b: 3 }.matches(4));
        assert!(!Nth { a: 2, b: 0 }.matches(-2));
    }

    #[test]
    fn test_selectors_are_parsed_once() {
        let engine = BuiltinSelectors::new();
        let tree = page();
        let root = ElementRef::root(&tree);
        for _ in 0..3 {
            assert_eq!(engine.matches("html", &root), Ok(true));
            assert!(engine.matches("p:has(a)", &root).is_err());
        }
        assert_eq!(engine.compare("html", ".a"), Ok(Ordering::Less));
        assert_eq!(engine.cached_len(), 3);
    }
}
