//! XPath 1.0 subset: tokenizer, recursive-descent parser and evaluator.
//!
//! Supported: location paths (absolute, relative, `//`), abbreviated steps
//! (`.`, `..`, `@`), the axes listed in [`Axis`], node tests (`*`, `p:*`,
//! names, `text()`, `node()`, `comment()`), predicates, unions, comparisons,
//! `and`/`or`, unary minus and a small core function library.

use crate::model::Namespaces;

use super::XNode;

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Path(LocationPath),
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
    Literal(String),
    Number(f64),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    fn descendant_or_self() -> Self {
        Self {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    Attribute,
    FollowingSibling,
    PrecedingSibling,
}

impl Axis {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "self" => Axis::SelfAxis,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "attribute" => Axis::Attribute,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeTest {
    Any,
    AnyInPrefix(String),
    Name {
        prefix: Option<String>,
        local: String,
    },
    Text,
    Node,
    Comment,
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    Dot,
    DotDot,
    At,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Pipe,
    Star,
    Minus,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    ColonColon,
    Literal(String),
    Number(f64),
    Name(String),
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let read_name = |start: usize| -> usize {
        let mut end = start;
        while end < chars.len() && is_name_char(chars[end]) {
            end += 1;
        }
        end
    };

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '/' if next == Some('/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '.' if next == Some('.') => {
                tokens.push(Token::DotDot);
                i += 2;
            }
            '.' if next.is_some_and(|n| n.is_ascii_digit()) => {
                let mut end = i + 1;
                while end < chars.len() && chars[end].is_ascii_digit() {
                    end += 1;
                }
                let text: String = chars[i..end].iter().collect();
                let value = text.parse::<f64>().map_err(|e| e.to_string())?;
                tokens.push(Token::Number(value));
                i = end;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '@' => {
                tokens.push(Token::At);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Neq);
                i += 2;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            ':' if next == Some(':') => {
                tokens.push(Token::ColonColon);
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != quote {
                    end += 1;
                }
                if end >= chars.len() {
                    return Err("unterminated string literal".into());
                }
                tokens.push(Token::Literal(chars[start..end].iter().collect()));
                i = end + 1;
            }
            c if c.is_ascii_digit() => {
                let mut end = i;
                while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
                    end += 1;
                }
                let text: String = chars[i..end].iter().collect();
                let value = text.parse::<f64>().map_err(|e| e.to_string())?;
                tokens.push(Token::Number(value));
                i = end;
            }
            c if is_name_start(c) => {
                let end = read_name(i);
                let mut name: String = chars[i..end].iter().collect();
                i = end;
                // prefix:local or prefix:*, but not axis::
                if chars.get(i) == Some(&':') && chars.get(i + 1) != Some(&':') {
                    match chars.get(i + 1) {
                        Some('*') => {
                            name.push_str(":*");
                            i += 2;
                        }
                        Some(&n) if is_name_start(n) => {
                            let end = read_name(i + 1);
                            name.push(':');
                            name.extend(&chars[i + 1..end]);
                            i = end;
                        }
                        _ => return Err(format!("dangling ':' after \"{name}\"")),
                    }
                }
                tokens.push(Token::Name(name));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Compile an expression. An empty expression selects the context node.
pub(crate) fn parse(src: &str) -> Result<Expr, String> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Ok(Expr::Path(LocationPath {
            absolute: false,
            steps: vec![Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: Vec::new(),
            }],
        }));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!(
            "unexpected token {:?} at position {}",
            parser.tokens[parser.pos], parser.pos
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.advance() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(format!("expected {expected:?}, found {tok:?}")),
            None => Err(format!("expected {expected:?}, found end of expression")),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(n)) if n == keyword)
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.peek_keyword("or") {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_equality()?;
        while self.peek_keyword("and") {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CmpOp::Eq,
                Some(Token::Neq) => CmpOp::Neq,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CmpOp::Lt,
                Some(Token::Le) => CmpOp::Le,
                Some(Token::Gt) => CmpOp::Gt,
                Some(Token::Ge) => CmpOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Minus) {
            self.advance();
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_path_expr()?;
        while self.peek() == Some(&Token::Pipe) {
            self.advance();
            let right = self.parse_path_expr()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot | Token::DotDot | Token::At | Token::Star | Token::Name(_))
        )
    }

    fn is_function_call(&self) -> bool {
        match (self.peek(), self.peek_at(1)) {
            (Some(Token::Name(name)), Some(Token::LParen)) => {
                !matches!(name.as_str(), "text" | "node" | "comment")
            }
            _ => false,
        }
    }

    fn parse_path_expr(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(Token::Slash) => {
                self.advance();
                let mut steps = Vec::new();
                if self.starts_step() {
                    self.parse_relative_steps(&mut steps)?;
                }
                Ok(Expr::Path(LocationPath {
                    absolute: true,
                    steps,
                }))
            }
            Some(Token::DoubleSlash) => {
                self.advance();
                let mut steps = vec![Step::descendant_or_self()];
                self.parse_relative_steps(&mut steps)?;
                Ok(Expr::Path(LocationPath {
                    absolute: true,
                    steps,
                }))
            }
            Some(Token::Literal(_) | Token::Number(_) | Token::LParen) => self.parse_filter_expr(),
            _ if self.is_function_call() => self.parse_filter_expr(),
            _ => {
                let mut steps = Vec::new();
                self.parse_relative_steps(&mut steps)?;
                Ok(Expr::Path(LocationPath {
                    absolute: false,
                    steps,
                }))
            }
        }
    }

    fn parse_filter_expr(&mut self) -> Result<Expr, String> {
        let primary = self.parse_primary()?;
        let predicates = self.parse_predicates()?;
        let mut steps = Vec::new();
        match self.peek() {
            Some(Token::Slash) => {
                self.advance();
                self.parse_relative_steps(&mut steps)?;
            }
            Some(Token::DoubleSlash) => {
                self.advance();
                steps.push(Step::descendant_or_self());
                self.parse_relative_steps(&mut steps)?;
            }
            _ => {}
        }
        if predicates.is_empty() && steps.is_empty() {
            return Ok(primary);
        }
        Ok(Expr::Filter {
            primary: Box::new(primary),
            predicates,
            steps,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::Literal(s)) => Ok(Expr::Literal(s)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Name(name)) => {
                self.expect(Token::LParen)?;
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    loop {
                        args.push(self.parse_or()?);
                        if self.peek() == Some(&Token::Comma) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RParen)?;
                Ok(Expr::Call(name, args))
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }

    fn parse_relative_steps(&mut self, steps: &mut Vec<Step>) -> Result<(), String> {
        loop {
            steps.push(self.parse_step()?);
            match self.peek() {
                Some(Token::Slash) => {
                    self.advance();
                }
                Some(Token::DoubleSlash) => {
                    self.advance();
                    steps.push(Step::descendant_or_self());
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_step(&mut self) -> Result<Step, String> {
        match self.peek() {
            Some(Token::Dot) => {
                self.advance();
                return Ok(Step {
                    axis: Axis::SelfAxis,
                    test: NodeTest::Node,
                    predicates: self.parse_predicates()?,
                });
            }
            Some(Token::DotDot) => {
                self.advance();
                return Ok(Step {
                    axis: Axis::Parent,
                    test: NodeTest::Node,
                    predicates: self.parse_predicates()?,
                });
            }
            _ => {}
        }

        let axis = if self.peek() == Some(&Token::At) {
            self.advance();
            Axis::Attribute
        } else if let (Some(Token::Name(name)), Some(Token::ColonColon)) = (self.peek(), self.peek_at(1)) {
            let axis = Axis::parse(name).ok_or_else(|| format!("unsupported axis \"{name}\""))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let test = match self.advance() {
            Some(Token::Star) => NodeTest::Any,
            Some(Token::Name(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    let test = match name.as_str() {
                        "text" => NodeTest::Text,
                        "node" => NodeTest::Node,
                        "comment" => NodeTest::Comment,
                        other => return Err(format!("function \"{other}\" cannot be used as a step")),
                    };
                    self.advance();
                    self.expect(Token::RParen)?;
                    test
                } else if let Some(prefix) = name.strip_suffix(":*") {
                    NodeTest::AnyInPrefix(prefix.to_string())
                } else if let Some((prefix, local)) = name.split_once(':') {
                    NodeTest::Name {
                        prefix: Some(prefix.to_string()),
                        local: local.to_string(),
                    }
                } else {
                    NodeTest::Name {
                        prefix: None,
                        local: name,
                    }
                }
            }
            other => return Err(format!("expected a node test, found {other:?}")),
        };

        Ok(Step {
            axis,
            test,
            predicates: self.parse_predicates()?,
        })
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>, String> {
        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            self.advance();
            predicates.push(self.parse_or()?);
            self.expect(Token::RBracket)?;
        }
        Ok(predicates)
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Result of evaluating an expression.
#[derive(Debug, Clone)]
pub(crate) enum Value<'a, 'i> {
    Nodes(Vec<XNode<'a, 'i>>),
    Str(String),
    Num(f64),
    Bool(bool),
}

impl<'a, 'i> Value<'a, 'i> {
    pub(crate) fn to_bool(&self) -> bool {
        match self {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    pub(crate) fn to_string_value(&self) -> String {
        match self {
            Value::Nodes(nodes) => nodes.first().map(|n| n.string_value()).unwrap_or_default(),
            Value::Str(s) => s.clone(),
            Value::Num(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Value::Num(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            other => other.to_string_value().trim().parse().unwrap_or(f64::NAN),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[derive(Clone, Copy)]
struct EvalCtx<'a, 'i> {
    node: XNode<'a, 'i>,
    position: usize,
    size: usize,
}

/// Evaluate a compiled expression with `node` as the context node.
pub(crate) fn evaluate<'a, 'i>(
    expr: &Expr,
    node: XNode<'a, 'i>,
    namespaces: &Namespaces,
) -> Result<Value<'a, 'i>, String> {
    let ctx = EvalCtx {
        node,
        position: 1,
        size: 1,
    };
    eval(expr, ctx, namespaces)
}

fn eval<'a, 'i>(expr: &Expr, ctx: EvalCtx<'a, 'i>, ns: &Namespaces) -> Result<Value<'a, 'i>, String> {
    match expr {
        Expr::Or(l, r) => Ok(Value::Bool(
            eval(l, ctx, ns)?.to_bool() || eval(r, ctx, ns)?.to_bool(),
        )),
        Expr::And(l, r) => Ok(Value::Bool(
            eval(l, ctx, ns)?.to_bool() && eval(r, ctx, ns)?.to_bool(),
        )),
        Expr::Compare(op, l, r) => {
            let left = eval(l, ctx, ns)?;
            let right = eval(r, ctx, ns)?;
            Ok(Value::Bool(compare(*op, &left, &right)))
        }
        Expr::Union(l, r) => {
            let (Value::Nodes(mut left), Value::Nodes(right)) = (eval(l, ctx, ns)?, eval(r, ctx, ns)?)
            else {
                return Err("union operands must be node-sets".into());
            };
            left.extend(right);
            sort_document_order(&mut left);
            Ok(Value::Nodes(left))
        }
        Expr::Neg(inner) => Ok(Value::Num(-eval(inner, ctx, ns)?.to_number())),
        Expr::Literal(s) => Ok(Value::Str(s.clone())),
        Expr::Number(n) => Ok(Value::Num(*n)),
        Expr::Path(path) => {
            let start = if path.absolute {
                vec![XNode::Node(ctx.node.document_root())]
            } else {
                vec![ctx.node]
            };
            Ok(Value::Nodes(apply_steps(start, &path.steps, ns)?))
        }
        Expr::Filter {
            primary,
            predicates,
            steps,
        } => {
            let Value::Nodes(mut nodes) = eval(primary, ctx, ns)? else {
                return Err("predicates and steps can only follow a node-set".into());
            };
            for predicate in predicates {
                nodes = filter(nodes, predicate, ns)?;
            }
            Ok(Value::Nodes(apply_steps(nodes, steps, ns)?))
        }
        Expr::Call(name, args) => call(name, args, ctx, ns),
    }
}

fn apply_steps<'a, 'i>(
    mut current: Vec<XNode<'a, 'i>>,
    steps: &[Step],
    ns: &Namespaces,
) -> Result<Vec<XNode<'a, 'i>>, String> {
    for step in steps {
        let mut next = Vec::new();
        for node in &current {
            let mut candidates: Vec<XNode<'a, 'i>> = axis_nodes(*node, step.axis)
                .into_iter()
                .filter(|n| matches_test(*n, &step.test, step.axis, ns))
                .collect();
            for predicate in &step.predicates {
                candidates = filter(candidates, predicate, ns)?;
            }
            next.extend(candidates);
        }
        sort_document_order(&mut next);
        current = next;
    }
    Ok(current)
}

/// Keep the nodes for which `predicate` holds; positions follow the given order.
fn filter<'a, 'i>(
    nodes: Vec<XNode<'a, 'i>>,
    predicate: &Expr,
    ns: &Namespaces,
) -> Result<Vec<XNode<'a, 'i>>, String> {
    let size = nodes.len();
    let mut kept = Vec::with_capacity(size);
    for (i, node) in nodes.into_iter().enumerate() {
        let ctx = EvalCtx {
            node,
            position: i + 1,
            size,
        };
        let keep = match eval(predicate, ctx, ns)? {
            Value::Num(n) => n == (i + 1) as f64,
            other => other.to_bool(),
        };
        if keep {
            kept.push(node);
        }
    }
    Ok(kept)
}

/// Nodes along an axis, nearest first for the reverse axes.
fn axis_nodes<'a, 'i>(node: XNode<'a, 'i>, axis: Axis) -> Vec<XNode<'a, 'i>> {
    let mut out = Vec::new();
    match (axis, node) {
        (Axis::SelfAxis, _) => out.push(node),
        (Axis::Child, XNode::Node(n)) => out.extend(n.children().map(XNode::Node)),
        (Axis::Descendant | Axis::DescendantOrSelf, XNode::Node(n)) => {
            if axis == Axis::DescendantOrSelf {
                out.push(node);
            }
            out.extend(n.descendants().filter(|d| *d != n).map(XNode::Node));
        }
        (Axis::DescendantOrSelf, XNode::Attribute { .. }) => out.push(node),
        (Axis::Parent, _) => {
            if let Some(parent) = node.parent() {
                out.push(XNode::Node(parent));
            }
        }
        (Axis::Ancestor | Axis::AncestorOrSelf, _) => {
            if axis == Axis::AncestorOrSelf {
                out.push(node);
            }
            let mut cur = node.parent();
            while let Some(p) = cur {
                out.push(XNode::Node(p));
                cur = p.parent();
            }
        }
        (Axis::Attribute, XNode::Node(n)) if n.is_element() => {
            out.extend((0..n.attributes().count()).map(|index| XNode::Attribute { owner: n, index }));
        }
        (Axis::FollowingSibling, XNode::Node(n)) => {
            let mut cur = n.next_sibling();
            while let Some(s) = cur {
                out.push(XNode::Node(s));
                cur = s.next_sibling();
            }
        }
        (Axis::PrecedingSibling, XNode::Node(n)) => {
            let mut cur = n.prev_sibling();
            while let Some(s) = cur {
                out.push(XNode::Node(s));
                cur = s.prev_sibling();
            }
        }
        _ => {}
    }
    out
}

fn matches_test(node: XNode<'_, '_>, test: &NodeTest, axis: Axis, ns: &Namespaces) -> bool {
    let principal_attr = axis == Axis::Attribute;
    match test {
        NodeTest::Node => true,
        NodeTest::Text => matches!(node, XNode::Node(n) if n.is_text()),
        NodeTest::Comment => matches!(node, XNode::Node(n) if n.is_comment()),
        NodeTest::Any => match node {
            XNode::Attribute { .. } => principal_attr,
            XNode::Node(n) => !principal_attr && n.is_element(),
        },
        NodeTest::AnyInPrefix(prefix) => {
            let Some(uri) = ns.get(prefix) else {
                return false;
            };
            node.expanded_name()
                .is_some_and(|(node_ns, _)| node_ns == Some(uri))
                && node.is_attribute() == principal_attr
        }
        NodeTest::Name { prefix, local } => {
            if node.is_attribute() != principal_attr {
                return false;
            }
            let Some((node_ns, node_local)) = node.expanded_name() else {
                return false;
            };
            if node_local != local {
                return false;
            }
            match prefix {
                // Unprefixed names match on the local name alone.
                None => true,
                Some(prefix) => ns.get(prefix).is_some_and(|uri| node_ns == Some(uri)),
            }
        }
    }
}

pub(crate) fn sort_document_order(nodes: &mut Vec<XNode<'_, '_>>) {
    nodes.sort_by_key(|n| n.order_key());
    nodes.dedup_by_key(|n| n.order_key());
}

fn compare(op: CmpOp, left: &Value<'_, '_>, right: &Value<'_, '_>) -> bool {
    match (left, right) {
        (Value::Nodes(l), Value::Nodes(r)) => l.iter().any(|a| {
            let a = Value::Str(a.string_value());
            r.iter().any(|b| compare_atomic(op, &a, &Value::Str(b.string_value())))
        }),
        (Value::Nodes(l), Value::Bool(b)) => compare_atomic(op, &Value::Bool(!l.is_empty()), &Value::Bool(*b)),
        (Value::Bool(b), Value::Nodes(r)) => compare_atomic(op, &Value::Bool(*b), &Value::Bool(!r.is_empty())),
        (Value::Nodes(l), other) => l
            .iter()
            .any(|a| compare_atomic(op, &Value::Str(a.string_value()), other)),
        (other, Value::Nodes(r)) => r
            .iter()
            .any(|b| compare_atomic(op, other, &Value::Str(b.string_value()))),
        _ => compare_atomic(op, left, right),
    }
}

fn compare_atomic(op: CmpOp, left: &Value<'_, '_>, right: &Value<'_, '_>) -> bool {
    match op {
        CmpOp::Eq | CmpOp::Neq => {
            let equal = match (left, right) {
                (Value::Bool(_), _) | (_, Value::Bool(_)) => left.to_bool() == right.to_bool(),
                (Value::Num(_), _) | (_, Value::Num(_)) => left.to_number() == right.to_number(),
                _ => left.to_string_value() == right.to_string_value(),
            };
            if op == CmpOp::Eq { equal } else { !equal }
        }
        CmpOp::Lt => left.to_number() < right.to_number(),
        CmpOp::Le => left.to_number() <= right.to_number(),
        CmpOp::Gt => left.to_number() > right.to_number(),
        CmpOp::Ge => left.to_number() >= right.to_number(),
    }
}

fn call<'a, 'i>(
    name: &str,
    args: &[Expr],
    ctx: EvalCtx<'a, 'i>,
    ns: &Namespaces,
) -> Result<Value<'a, 'i>, String> {
    let arity = |expected: std::ops::RangeInclusive<usize>| -> Result<(), String> {
        if expected.contains(&args.len()) {
            Ok(())
        } else {
            Err(format!("{name}() takes {expected:?} argument(s), got {}", args.len()))
        }
    };
    let string_arg = |i: usize| -> Result<String, String> {
        match args.get(i) {
            Some(expr) => Ok(eval(expr, ctx, ns)?.to_string_value()),
            None => Ok(ctx.node.string_value()),
        }
    };
    let node_arg = |i: usize| -> Result<Option<XNode<'a, 'i>>, String> {
        match args.get(i) {
            Some(expr) => match eval(expr, ctx, ns)? {
                Value::Nodes(nodes) => Ok(nodes.first().copied()),
                _ => Err(format!("{name}() expects a node-set")),
            },
            None => Ok(Some(ctx.node)),
        }
    };

    match name {
        "position" => {
            arity(0..=0)?;
            Ok(Value::Num(ctx.position as f64))
        }
        "last" => {
            arity(0..=0)?;
            Ok(Value::Num(ctx.size as f64))
        }
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        "not" => {
            arity(1..=1)?;
            Ok(Value::Bool(!eval(&args[0], ctx, ns)?.to_bool()))
        }
        "boolean" => {
            arity(1..=1)?;
            Ok(Value::Bool(eval(&args[0], ctx, ns)?.to_bool()))
        }
        "number" => {
            arity(0..=1)?;
            Ok(Value::Num(Value::Str(string_arg(0)?).to_number()))
        }
        "count" => {
            arity(1..=1)?;
            match eval(&args[0], ctx, ns)? {
                Value::Nodes(nodes) => Ok(Value::Num(nodes.len() as f64)),
                _ => Err("count() expects a node-set".into()),
            }
        }
        "name" => {
            arity(0..=1)?;
            Ok(Value::Str(node_arg(0)?.map(|n| n.qualified_name()).unwrap_or_default()))
        }
        "local-name" => {
            arity(0..=1)?;
            Ok(Value::Str(
                node_arg(0)?
                    .and_then(|n| n.expanded_name().map(|(_, local)| local.to_string()))
                    .unwrap_or_default(),
            ))
        }
        "string" => {
            arity(0..=1)?;
            Ok(Value::Str(string_arg(0)?))
        }
        "string-length" => {
            arity(0..=1)?;
            Ok(Value::Num(string_arg(0)?.chars().count() as f64))
        }
        "normalize-space" => {
            arity(0..=1)?;
            Ok(Value::Str(
                string_arg(0)?.split_whitespace().collect::<Vec<_>>().join(" "),
            ))
        }
        "concat" => {
            if args.len() < 2 {
                return Err("concat() takes at least 2 arguments".into());
            }
            let mut out = String::new();
            for i in 0..args.len() {
                out.push_str(&string_arg(i)?);
            }
            Ok(Value::Str(out))
        }
        "contains" => {
            arity(2..=2)?;
            Ok(Value::Bool(string_arg(0)?.contains(&string_arg(1)?)))
        }
        "starts-with" => {
            arity(2..=2)?;
            Ok(Value::Bool(string_arg(0)?.starts_with(&string_arg(1)?)))
        }
        "substring-before" => {
            arity(2..=2)?;
            let (haystack, needle) = (string_arg(0)?, string_arg(1)?);
            Ok(Value::Str(
                haystack.split_once(needle.as_str()).map(|(b, _)| b.to_string()).unwrap_or_default(),
            ))
        }
        "substring-after" => {
            arity(2..=2)?;
            let (haystack, needle) = (string_arg(0)?, string_arg(1)?);
            Ok(Value::Str(
                haystack.split_once(needle.as_str()).map(|(_, a)| a.to_string()).unwrap_or_default(),
            ))
        }
        other => Err(format!("unsupported function {other}()")),
    }
}
