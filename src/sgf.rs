//! Text game records in the SGF tree notation.
//!
//! Reading is done in two passes: the text is first split into a raw tree of
//! nodes and properties, then each raw tree is interpreted once its board size
//! is known. Both passes, and the writer, walk the tree with explicit stacks.

use std::fmt::Write as _;
use std::io::{self, Read, Write};

use tracing::{debug, instrument, trace};

use crate::board::{Color, Mark, MarkKind, Point};
use crate::constants::{MAX_BOARD_SIZE, MIN_BOARD_SIZE, VALUE_RIGHT};
use crate::error::ParseError;
use crate::game::GameTree;
use crate::info::{GameInfo, GameResult};
use crate::tree::{GameNode, Move, MoveTree, NodeId};

/// How to interpret the parsed games.
#[derive(Clone, Debug, Default)]
pub struct ParseOptions {
    /// Treat the records as problem collections: split root variations into
    /// separate games and derive node values from `RIGHT` comments.
    pub as_problems: bool,
}

impl ParseOptions {
    pub fn problems() -> Self {
        Self { as_problems: true }
    }
}

/// Output layout of the writer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum WriteStyle {
    /// No whitespace and no file-format header.
    Compact,
    /// One line per subtree, with the `GM`/`FF`/`CA`/`AP` header.
    #[default]
    Pretty,
}

// =============================================================================
// Reading
// =============================================================================

/// Parses every game of a collection.
pub fn parse(text: &str) -> Result<Vec<GameTree>, ParseError> {
    parse_with(text, &ParseOptions::default())
}

/// Reads and parses a collection from `reader`.
pub fn read<R: Read>(mut reader: R, options: &ParseOptions) -> Result<Vec<GameTree>, ParseError> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    parse_with(&text, options)
}

#[instrument(skip_all, fields(bytes = text.len(), problems = options.as_problems))]
pub fn parse_with(text: &str, options: &ParseOptions) -> Result<Vec<GameTree>, ParseError> {
    let raw = RawParser::new(text).collection()?;

    let mut parts = Vec::with_capacity(raw.len());
    for raw_tree in &raw {
        parts.push(interpret(raw_tree)?);
    }

    if options.as_problems {
        let mut split = Vec::new();
        for (info, tree) in &parts {
            let root = tree.root();
            if tree.node(root).setup.is_empty() {
                for &child in tree.children(root) {
                    split.push((info.clone(), tree.subtree(child)));
                }
            }
        }
        split.append(&mut parts);
        parts = split;
        for (_, tree) in &mut parts {
            assign_problem_values(tree);
        }
    }

    debug!(games = parts.len(), "parsed game records");
    Ok(parts
        .into_iter()
        .map(|(info, tree)| GameTree::from_parts(info, tree))
        .collect())
}

/// Marks leaves whose comment contains `RIGHT` as correct and other leaves
/// as wrong. If no leaf is correct, every node is.
fn assign_problem_values(tree: &mut MoveTree) {
    let root = tree.root();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !tree.children(id).is_empty() {
            stack.extend_from_slice(tree.children(id));
            continue;
        }
        let comment = &tree.node(id).comment;
        if comment.contains("RIGHT") {
            let stripped = if let Some(rest) = comment.strip_suffix("RIGHT") {
                Some(rest.to_string())
            } else {
                comment.strip_prefix("RIGHT").map(str::to_string)
            };
            if let Some(stripped) = stripped {
                tree.node_mut(id).comment = stripped;
            }
            tree.set_move_value(id, VALUE_RIGHT);
        } else {
            tree.set_move_value(id, 0);
        }
    }

    if tree.node(root).value < VALUE_RIGHT {
        for id in tree.preorder() {
            tree.node_mut(id).value = VALUE_RIGHT;
        }
    }
}

/// A node as read from the text, before interpretation.
#[derive(Debug, Default)]
struct RawNode {
    properties: Vec<(String, Vec<String>)>,
    children: Vec<usize>,
}

/// One game tree as read from the text. Node 0 is the root.
#[derive(Debug, Default)]
struct RawTree {
    nodes: Vec<RawNode>,
}

struct RawParser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> RawParser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    /// Collection = GameTree+ ; GameTree = "(" Node+ GameTree* ")".
    /// Text outside of game trees is ignored.
    fn collection(mut self) -> Result<Vec<RawTree>, ParseError> {
        let mut trees: Vec<RawTree> = Vec::new();
        // Node to attach to when each open parenthesis closes.
        let mut open: Vec<Option<usize>> = Vec::new();
        let mut current: Option<usize> = None;

        while let Some(c) = self.peek() {
            let position = self.pos;
            match c {
                '(' => {
                    self.bump();
                    if open.is_empty() {
                        trees.push(RawTree::default());
                        current = None;
                    }
                    open.push(current);
                }
                ')' => {
                    self.bump();
                    current = open.pop().ok_or(ParseError::Unbalanced { position })?;
                }
                ';' if !open.is_empty() => {
                    self.bump();
                    let properties = self.properties()?;
                    let tree = trees.last_mut().ok_or(ParseError::NoGameTree)?;
                    let id = tree.nodes.len();
                    match current {
                        Some(parent) => tree.nodes[parent].children.push(id),
                        None if id > 0 => {
                            return Err(ParseError::UnexpectedChar { character: c, position });
                        }
                        None => {}
                    }
                    tree.nodes.push(RawNode {
                        properties,
                        children: Vec::new(),
                    });
                    current = Some(id);
                }
                c if open.is_empty() || c.is_whitespace() => {
                    self.bump();
                }
                _ => return Err(ParseError::UnexpectedChar { character: c, position }),
            }
        }

        if !open.is_empty() {
            return Err(ParseError::Unbalanced { position: self.pos });
        }
        trees.retain(|t| !t.nodes.is_empty());
        if trees.is_empty() {
            return Err(ParseError::NoGameTree);
        }
        Ok(trees)
    }

    fn properties(&mut self) -> Result<Vec<(String, Vec<String>)>, ParseError> {
        let mut properties = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None | Some(';' | '(' | ')') => return Ok(properties),
                Some(c) if c.is_ascii_alphabetic() => {
                    let name = self.identifier();
                    let values = self.values(&name)?;
                    properties.push((name, values));
                }
                Some(c) => {
                    return Err(ParseError::UnexpectedChar {
                        character: c,
                        position: self.pos,
                    });
                }
            }
        }
    }

    /// Reads a property name. Lowercase letters (long FF[3] names such as
    /// `AddBlack`) are dropped.
    fn identifier(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek().filter(char::is_ascii_alphabetic) {
            self.bump();
            if c.is_ascii_uppercase() {
                name.push(c);
            }
        }
        name
    }

    fn values(&mut self, name: &str) -> Result<Vec<String>, ParseError> {
        let mut values = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('[') => {
                    let start = self.pos;
                    self.bump();
                    values.push(self.value(name, start)?);
                }
                Some(c) if values.is_empty() => {
                    return Err(ParseError::UnexpectedChar {
                        character: c,
                        position: self.pos,
                    });
                }
                None if values.is_empty() => {
                    return Err(ParseError::UnexpectedEof { position: self.pos });
                }
                _ => return Ok(values),
            }
        }
    }

    /// Reads up to the closing `]`. A backslash escapes the next character;
    /// an escaped line break is removed.
    fn value(&mut self, name: &str, start: usize) -> Result<String, ParseError> {
        let unterminated = || ParseError::UnterminatedValue {
            property: name.to_string(),
            position: start,
        };
        let mut value = String::new();
        loop {
            match self.bump().ok_or_else(unterminated)? {
                ']' => return Ok(value),
                '\\' => match self.bump().ok_or_else(unterminated)? {
                    '\n' => {
                        if self.peek() == Some('\r') {
                            self.bump();
                        }
                    }
                    '\r' => {
                        if self.peek() == Some('\n') {
                            self.bump();
                        }
                    }
                    escaped => value.push(escaped),
                },
                c => value.push(c),
            }
        }
    }
}

/// Turns a raw tree into game metadata and a move tree.
fn interpret(raw: &RawTree) -> Result<(GameInfo, MoveTree), ParseError> {
    let mut info = GameInfo::default();
    if let Some(values) = property(&raw.nodes[0], "SZ") {
        info.board_size = parse_size(values)?;
    }

    let mut root_node = GameNode::default();
    fill_node(&mut root_node, &raw.nodes[0], &mut info)?;
    // The root holds the initial position; a move found there gets a node of its own
    let root_move = root_node.mv.take().zip(root_node.color.take());
    let mut tree = MoveTree::with_root(root_node);
    let mut top = tree.root();
    if let Some((mv, color)) = root_move {
        top = tree.push_child(top, GameNode::with_move(color, mv));
    }

    let mut stack: Vec<(usize, NodeId)> = raw.nodes[0]
        .children
        .iter()
        .rev()
        .map(|&c| (c, top))
        .collect();
    while let Some((raw_id, parent)) = stack.pop() {
        let mut node = GameNode::default();
        fill_node(&mut node, &raw.nodes[raw_id], &mut info)?;
        let id = tree.push_child(parent, node);
        stack.extend(raw.nodes[raw_id].children.iter().rev().map(|&c| (c, id)));
    }
    Ok((info, tree))
}

fn property<'n>(node: &'n RawNode, name: &str) -> Option<&'n [String]> {
    node.properties
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_slice())
}

fn parse_size(values: &[String]) -> Result<usize, ParseError> {
    let text = first(values);
    // Rectangular boards ("19:19") are read by their first dimension.
    let width = text.split(':').next().unwrap_or_default().trim();
    let size: usize = width.parse().map_err(|_| invalid("SZ", text))?;
    if !(MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&size) {
        return Err(ParseError::UnsupportedBoardSize(size));
    }
    Ok(size)
}

fn first(values: &[String]) -> &str {
    values.first().map_or("", String::as_str)
}

fn invalid(property: &str, value: &str) -> ParseError {
    ParseError::InvalidValue {
        property: property.to_string(),
        value: value.to_string(),
    }
}

fn simple_text(values: &[String]) -> Option<String> {
    let text = first(values).trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn fill_node(node: &mut GameNode, raw: &RawNode, info: &mut GameInfo) -> Result<(), ParseError> {
    let size = info.board_size;
    for (name, values) in &raw.properties {
        match name.as_str() {
            "B" | "W" => {
                let color = if name == "B" { Color::Black } else { Color::White };
                let mv = match parse_point(first(values), size)? {
                    Some(p) => Move::Play(p),
                    None => Move::Pass,
                };
                node.mv = Some(mv);
                node.color = Some(color);
            }
            "AB" | "AW" | "AE" => {
                let color = match name.as_str() {
                    "AB" => Some(Color::Black),
                    "AW" => Some(Color::White),
                    _ => None,
                };
                for p in parse_point_list(values, size)? {
                    node.set_stone(p, color);
                }
            }
            "C" => node.comment = first(values).to_string(),
            "TR" | "CR" | "SQ" | "MA" | "TB" | "TW" => {
                let kind = match name.as_str() {
                    "TR" => MarkKind::Triangle,
                    "CR" => MarkKind::Circle,
                    "SQ" => MarkKind::Square,
                    "MA" => MarkKind::Cross,
                    "TB" => MarkKind::BlackTerritory,
                    _ => MarkKind::WhiteTerritory,
                };
                for (x, y) in parse_point_list(values, size)? {
                    node.add_mark(Mark::new(x, y, kind));
                }
            }
            "LB" => {
                for value in values {
                    let (point, label) = value.split_once(':').ok_or_else(|| invalid("LB", value))?;
                    let Some((x, y)) = parse_point(point, size)? else {
                        return Err(invalid("LB", value));
                    };
                    if let Some(c) = label.chars().next() {
                        node.add_mark(Mark::new(x, y, MarkKind::Label(c)));
                    }
                }
            }
            "SZ" => {}
            "KM" => {
                let text = first(values).trim();
                info.komi = text.replace(',', ".").parse().map_err(|_| invalid("KM", text))?;
            }
            "HA" => {
                let text = first(values).trim();
                info.handicap = text.parse().map_err(|_| invalid("HA", text))?;
            }
            "RU" => info.rules = simple_text(values),
            "PB" => info.black_name = simple_text(values),
            "PW" => info.white_name = simple_text(values),
            "BR" => info.black_rank = simple_text(values),
            "WR" => info.white_rank = simple_text(values),
            "RE" => info.result = GameResult::parse(first(values)),
            "PL" => {
                info.first_player = match first(values).trim() {
                    "B" | "b" => Some(Color::Black),
                    "W" | "w" => Some(Color::White),
                    other => return Err(invalid("PL", other)),
                }
            }
            "EV" => info.event = simple_text(values),
            "DT" => info.date = simple_text(values),
            "RO" => info.round = simple_text(values),
            "PC" => info.place = simple_text(values),
            "GN" => info.game_name = simple_text(values),
            "AP" => info.application = simple_text(values),
            other => trace!(property = other, "skipping unsupported property"),
        }
    }
    Ok(())
}

/// Parses a point; an empty value (or `tt` on boards up to 19) is a pass.
pub fn parse_point(text: &str, size: usize) -> Result<Option<Point>, ParseError> {
    let bytes = text.as_bytes();
    if bytes.is_empty() || (text == "tt" && size <= 19) {
        return Ok(None);
    }
    if bytes.len() != 2 || !bytes.iter().all(u8::is_ascii_lowercase) {
        return Err(invalid("point", text));
    }
    let x = usize::from(bytes[0] - b'a');
    let y = usize::from(bytes[1] - b'a');
    if x >= size || y >= size {
        return Err(ParseError::InvalidCoordinate { x, y, size });
    }
    Ok(Some((x, y)))
}

/// Parses point lists, expanding compressed rectangles such as `aa:cc`.
fn parse_point_list(values: &[String], size: usize) -> Result<Vec<Point>, ParseError> {
    let mut points = Vec::new();
    for value in values {
        match value.split_once(':') {
            Some((from, to)) => {
                let (Some(a), Some(b)) = (parse_point(from, size)?, parse_point(to, size)?) else {
                    return Err(invalid("point list", value));
                };
                for y in a.1.min(b.1)..=a.1.max(b.1) {
                    for x in a.0.min(b.0)..=a.0.max(b.0) {
                        points.push((x, y));
                    }
                }
            }
            None => points.extend(parse_point(value, size)?),
        }
    }
    Ok(points)
}

// =============================================================================
// Writing
// =============================================================================

pub fn point_to_string((x, y): Point) -> String {
    let mut s = String::with_capacity(2);
    s.push(char::from(b'a' + x as u8));
    s.push(char::from(b'a' + y as u8));
    s
}

/// Writes `game` to `out`.
pub fn write<W: Write>(game: &GameTree, style: WriteStyle, mut out: W) -> io::Result<()> {
    out.write_all(to_string(game, style).as_bytes())?;
    out.flush()
}

/// Serializes `game` as a single game tree.
pub fn to_string(game: &GameTree, style: WriteStyle) -> String {
    enum Step {
        Node(NodeId, bool),
        Close,
    }

    let tree = game.tree();
    let mut out = String::new();
    let mut stack = vec![Step::Node(tree.root(), true)];
    while let Some(step) = stack.pop() {
        match step {
            Step::Close => out.push(')'),
            Step::Node(id, parens) => {
                if style == WriteStyle::Pretty {
                    out.push('\n');
                }
                if parens {
                    out.push('(');
                    stack.push(Step::Close);
                }
                if id == tree.root() {
                    write_header(&mut out, &game.info, style);
                } else {
                    out.push(';');
                }
                write_node(&mut out, tree.node(id));
                let children = tree.children(id);
                let branching = children.len() > 1;
                stack.extend(children.iter().rev().map(|&c| Step::Node(c, branching)));
            }
        }
    }
    if style == WriteStyle::Pretty {
        out.push('\n');
    }
    out
}

fn write_property(out: &mut String, name: &str, value: &str) {
    let _ = write!(out, "{name}[");
    for c in value.chars() {
        if c == ']' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push(']');
}

fn write_optional(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        write_property(out, name, value);
    }
}

fn write_header(out: &mut String, info: &GameInfo, style: WriteStyle) {
    out.push(';');
    if style == WriteStyle::Pretty {
        out.push_str("GM[1]FF[4]CA[UTF-8]");
        write_property(out, "AP", concat!("kifu:", env!("CARGO_PKG_VERSION")));
    }
    write_optional(out, "RU", info.rules.as_deref());
    write_optional(out, "PW", info.white_name.as_deref());
    write_optional(out, "PB", info.black_name.as_deref());
    write_optional(out, "WR", info.white_rank.as_deref());
    write_optional(out, "BR", info.black_rank.as_deref());
    let _ = write!(out, "SZ[{}]KM[{}]HA[{}]", info.board_size, info.komi, info.handicap);
    if let Some(result) = &info.result {
        write_property(out, "RE", &result.to_string());
    }
    if let Some(color) = info.first_player {
        out.push_str(match color {
            Color::Black => "PL[B]",
            Color::White => "PL[W]",
        });
    }
    write_optional(out, "EV", info.event.as_deref());
    write_optional(out, "DT", info.date.as_deref());
    write_optional(out, "RO", info.round.as_deref());
    write_optional(out, "PC", info.place.as_deref());
    write_optional(out, "GN", info.game_name.as_deref());
}

fn write_points(out: &mut String, name: &str, points: impl IntoIterator<Item = Point>) {
    let mut points = points.into_iter().peekable();
    if points.peek().is_none() {
        return;
    }
    out.push_str(name);
    for p in points {
        let _ = write!(out, "[{}]", point_to_string(p));
    }
}

fn write_node(out: &mut String, node: &GameNode) {
    if let (Some(mv), Some(color)) = (node.mv, node.color) {
        let side = match color {
            Color::Black => 'B',
            Color::White => 'W',
        };
        match mv {
            Move::Play(p) => {
                let _ = write!(out, "{side}[{}]", point_to_string(p));
            }
            Move::Pass => {
                let _ = write!(out, "{side}[]");
            }
            Move::Resign => {}
        }
    }

    for (name, color) in [
        ("AW", Some(Color::White)),
        ("AB", Some(Color::Black)),
        ("AE", None),
    ] {
        write_points(
            out,
            name,
            node.setup.iter().filter(|s| s.color == color).map(|s| s.point),
        );
    }

    for (name, kind) in [
        ("TR", MarkKind::Triangle),
        ("CR", MarkKind::Circle),
        ("SQ", MarkKind::Square),
        ("MA", MarkKind::Cross),
        ("TB", MarkKind::BlackTerritory),
        ("TW", MarkKind::WhiteTerritory),
    ] {
        write_points(
            out,
            name,
            node.marks.iter().filter(|m| m.kind == kind).map(|m| m.point),
        );
    }
    let mut labels = node.marks.iter().filter_map(|m| match m.kind {
        MarkKind::Label(c) => Some((m.point, c)),
        _ => None,
    });
    if let Some(first) = labels.next() {
        out.push_str("LB");
        for (p, c) in std::iter::once(first).chain(labels) {
            out.push('[');
            out.push_str(&point_to_string(p));
            out.push(':');
            if c == ']' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
            out.push(']');
        }
    }

    if !node.comment.is_empty() {
        write_property(out, "C", &node.comment);
    }
}
