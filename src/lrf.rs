//! Compact binary game records.
//!
//! Layout, in order:
//!
//! 1. board size (5 bits);
//! 2. lowest and highest intersection of the stones' bounding rectangle
//!    (9 bits each, `y * size + x`); `1` then `0` encodes an empty board;
//! 3. for each cell of that rectangle, column by column: an occupied bit,
//!    then a color bit (set for White) if occupied;
//! 4. optional data count (9 bits), then per mark: tag `1` (2 bits),
//!    intersection (9 bits), mark code (8 bits);
//! 5. a tree-present bit, then the bounding rectangle of the moves (two
//!    9-bit intersections) and the command stream;
//! 6. optional trailing data: a 4-bit type, type 3 being the level (8 bits).
//!
//! In the command stream a set bit is a move, addressed inside the moves'
//! rectangle with just enough bits for its area. A clear bit is followed by
//! a 2-bit command: 1 = set the node value (7 bits), 2 = remember a branch
//! point, 3 = go back to the last branch point. Colors are implicit, Black
//! playing first.

use std::io::{Read, Write};

use tracing::{debug, instrument, warn};

use crate::bits::{BitReader, BitWriter, bits_for};
use crate::board::{Board, Color, Mark, MarkKind, Point, Rect};
use crate::constants::*;
use crate::error::{EncodeError, ParseError};
use crate::game::GameTree;
use crate::tree::{Move, NodeId};

const COMMAND_SET_RESULT: u64 = 1;
const COMMAND_NEW_NODE: u64 = 2;
const COMMAND_END_NODE: u64 = 3;

fn check_size(size: usize) -> Result<(), EncodeError> {
    if (MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&size) {
        Ok(())
    } else {
        Err(EncodeError::UnsupportedBoardSize(size))
    }
}

// =============================================================================
// Board section
// =============================================================================

fn write_board(w: &mut BitWriter, board: &Board, marks: &[Mark]) {
    let size = board.size();
    w.write(size as u64, BITS_BOARD_SIZE);

    match board.bounds() {
        Some(rect) => {
            w.write((rect.top * size + rect.left) as u64, BITS_INTERSECTION);
            w.write((rect.bottom * size + rect.right) as u64, BITS_INTERSECTION);
            for x in rect.left..=rect.right {
                for y in rect.top..=rect.bottom {
                    match board.get(x, y).color() {
                        None => w.write_bit(false),
                        Some(color) => {
                            w.write_bit(true);
                            w.write_bit(color == Color::White);
                        }
                    }
                }
            }
        }
        None => {
            w.write(1, BITS_INTERSECTION);
            w.write(0, BITS_INTERSECTION);
        }
    }

    let marks: Vec<&Mark> = marks
        .iter()
        .filter(|m| !matches!(m.kind, MarkKind::Label(_)))
        .collect();
    w.write(marks.len() as u64, BITS_DATA_COUNT);
    for mark in marks {
        let (x, y) = mark.point;
        w.write(DATA_TYPE_MARK, BITS_DATA_TYPE);
        w.write((y * size + x) as u64, BITS_INTERSECTION);
        w.write(u64::from(mark.kind.code()), BITS_MARK_TYPE);
    }
}

fn point_at(index: u64, size: usize) -> Result<Point, ParseError> {
    let index = index as usize;
    let (x, y) = (index % size, index / size);
    if y >= size {
        return Err(ParseError::InvalidCoordinate { x, y, size });
    }
    Ok((x, y))
}

fn read_point(r: &mut BitReader<'_>, size: usize) -> Result<Point, ParseError> {
    point_at(r.read(BITS_INTERSECTION)?, size)
}

fn read_rect(r: &mut BitReader<'_>, size: usize) -> Result<Rect, ParseError> {
    let (left, top) = read_point(r, size)?;
    let (right, bottom) = read_point(r, size)?;
    rect_from_corners((left, top), (right, bottom))
}

fn rect_from_corners((left, top): Point, (right, bottom): Point) -> Result<Rect, ParseError> {
    if right < left || bottom < top {
        return Err(ParseError::InvalidValue {
            property: "bounds".to_string(),
            value: format!("{left},{top} {right},{bottom}"),
        });
    }
    Ok(Rect {
        left,
        top,
        right,
        bottom,
    })
}

fn read_board(r: &mut BitReader<'_>) -> Result<Board, ParseError> {
    let size = r.read(BITS_BOARD_SIZE)? as usize;
    if !(MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&size) {
        return Err(ParseError::UnsupportedBoardSize(size));
    }
    let mut board = Board::new(size);

    let low = r.read(BITS_INTERSECTION)?;
    let high = r.read(BITS_INTERSECTION)?;
    if low <= high {
        let rect = rect_from_corners(point_at(low, size)?, point_at(high, size)?)?;
        for x in rect.left..=rect.right {
            for y in rect.top..=rect.bottom {
                if r.read_bit()? {
                    let color = if r.read_bit()? { Color::White } else { Color::Black };
                    board.set(x, y, color.into());
                }
            }
        }
    }

    let count = r.read(BITS_DATA_COUNT)?;
    for _ in 0..count {
        let tag = r.read(BITS_DATA_TYPE)?;
        if tag != DATA_TYPE_MARK {
            return Err(ParseError::InvalidValue {
                property: "data type".to_string(),
                value: tag.to_string(),
            });
        }
        let (x, y) = read_point(r, size)?;
        let code = r.read(BITS_MARK_TYPE)? as u8;
        match MarkKind::from_code(code) {
            Some(kind) => board.set_mark(Mark::new(x, y, kind)),
            None => warn!(code, "skipping unknown mark type"),
        }
    }
    Ok(board)
}

/// Encodes a lone board position with its marks.
pub fn encode_board(board: &Board) -> Result<Vec<u8>, EncodeError> {
    check_size(board.size())?;
    let mut w = BitWriter::new();
    write_board(&mut w, board, board.marks());
    Ok(w.finish())
}

/// Decodes a board written by [`encode_board`].
pub fn decode_board(bytes: &[u8]) -> Result<Board, ParseError> {
    read_board(&mut BitReader::new(bytes))
}

// =============================================================================
// Game
// =============================================================================

/// Encodes the initial position and the variation tree of `game`.
#[instrument(skip_all, fields(size = game.size()))]
pub fn encode(game: &GameTree) -> Result<Vec<u8>, EncodeError> {
    let size = game.size();
    check_size(size)?;
    let tree = game.tree();
    let root = tree.root();

    let reverse = match game.info.first_player {
        Some(color) => color == Color::White,
        None => tree
            .children(root)
            .first()
            .is_some_and(|&c| tree.node(c).color == Some(Color::White)),
    };

    let mut board = game.initial_board();
    if reverse {
        board.reverse_colors();
    }
    let mut w = BitWriter::new();
    write_board(&mut w, &board, &tree.node(root).marks);

    if tree.is_empty() {
        w.write_bit(false);
    } else {
        w.write_bit(true);
        let first = if reverse { Color::White } else { Color::Black };
        write_tree(&mut w, game, first)?;
    }

    if let Some(level) = game.info.tags.get(TAG_LEVEL) {
        match level.trim().parse::<u8>() {
            Ok(level) => {
                w.write(EXTRA_TYPE_LEVEL, BITS_EXTRA_TYPE);
                w.write(u64::from(level), BITS_LEVEL);
            }
            Err(_) => warn!(level = %level, "level tag is not a byte, not written"),
        }
    }

    debug!(bits = w.len(), "encoded binary record");
    Ok(w.finish())
}

/// Writes the move section. Colors are implicit, so every move must
/// alternate with its parent's, starting with `first`.
fn write_tree(w: &mut BitWriter, game: &GameTree, first: Color) -> Result<(), EncodeError> {
    enum Emit {
        Node(NodeId),
        NewNode,
    }

    let tree = game.tree();
    let size = game.size();
    let root = tree.root();

    let mut moves = Vec::new();
    for id in tree.preorder().into_iter().skip(1) {
        let node = tree.node(id);
        let point = match node.mv {
            Some(Move::Play(p)) => p,
            Some(other) => return Err(EncodeError::UnsupportedMove(format!("{other:?}"))),
            None => return Err(EncodeError::UnsupportedMove("setup node".to_string())),
        };
        let parent = tree.parent(id).unwrap_or(root);
        let expected = tree.node(parent).color.map_or(first, Color::opponent);
        if node.color != Some(expected) {
            return Err(EncodeError::OutOfTurn { point });
        }
        // The decoder merges identical siblings
        let mut earlier = tree.children(parent).iter().take_while(|&&c| c != id);
        if earlier.any(|&c| tree.node(c).mv == node.mv) {
            return Err(EncodeError::DuplicateVariation { point });
        }
        moves.push(point);
    }
    let Some(rect) = Rect::enclosing(moves) else {
        return Err(EncodeError::UnsupportedMove("empty tree".to_string()));
    };
    w.write((rect.top * size + rect.left) as u64, BITS_INTERSECTION);
    w.write((rect.bottom * size + rect.right) as u64, BITS_INTERSECTION);
    let bits = bits_for(rect.area());
    let width = rect.width();

    let push_children = |stack: &mut Vec<Emit>, id: NodeId| {
        let children = tree.children(id);
        for (i, &child) in children.iter().enumerate().rev() {
            stack.push(Emit::Node(child));
            if i + 1 < children.len() {
                stack.push(Emit::NewNode);
            }
        }
    };

    let mut stack = Vec::new();
    push_children(&mut stack, root);
    while let Some(emit) = stack.pop() {
        match emit {
            Emit::NewNode => {
                w.write_bit(false);
                w.write(COMMAND_NEW_NODE, BITS_COMMAND);
            }
            Emit::Node(id) => {
                let node = tree.node(id);
                if let Some(Move::Play((x, y))) = node.mv {
                    w.write_bit(true);
                    w.write(((y - rect.top) * width + (x - rect.left)) as u64, bits);
                }
                if tree.children(id).is_empty() {
                    w.write_bit(false);
                    w.write(COMMAND_SET_RESULT, BITS_COMMAND);
                    w.write(node.value.max(0) as u64, BITS_RESULT);
                    w.write_bit(false);
                    w.write(COMMAND_END_NODE, BITS_COMMAND);
                }
                push_children(&mut stack, id);
            }
        }
    }
    Ok(())
}

/// Writes the encoded game to `out`.
pub fn write<W: Write>(game: &GameTree, mut out: W) -> Result<(), EncodeError> {
    out.write_all(&encode(game)?)?;
    out.flush()?;
    Ok(())
}

/// Decodes a game. The cursor is left at the root.
#[instrument(skip_all, fields(bytes = bytes.len()))]
pub fn decode(bytes: &[u8]) -> Result<GameTree, ParseError> {
    let mut r = BitReader::new(bytes);
    let board = read_board(&mut r)?;
    let size = board.size();

    let mut game = GameTree::with_board(&board, DEFAULT_KOMI);
    for &mark in board.marks() {
        game.add_mark(mark);
    }

    if r.read_bit()? {
        let rect = read_rect(&mut r, size)?;
        let width = rect.width();
        let area = rect.area();
        let bits = bits_for(area);

        let mut checkpoints = vec![0usize];
        let mut depth = 0usize;
        while !checkpoints.is_empty() {
            if r.read_bit()? {
                let index = r.read(bits)? as usize;
                let (x, y) = (rect.left + index % width, rect.top + index / width);
                if index >= area {
                    return Err(ParseError::InvalidCoordinate { x, y, size });
                }
                game.place_move(Move::Play((x, y)), game.next_player());
                depth += 1;
                continue;
            }
            match r.read(BITS_COMMAND)? {
                COMMAND_SET_RESULT => game.set_move_value(r.read(BITS_RESULT)? as i8),
                COMMAND_NEW_NODE => checkpoints.push(depth),
                COMMAND_END_NODE => {
                    let target = checkpoints.pop().unwrap_or_default();
                    game.navigate(target as isize - depth as isize);
                    depth = target;
                }
                other => return Err(ParseError::UnknownCommand(other)),
            }
        }
    }

    // Trailing data is optional and may be cut short.
    if let Ok(EXTRA_TYPE_LEVEL) = r.read(BITS_EXTRA_TYPE) {
        if let Ok(level) = r.read(BITS_LEVEL) {
            game.info.tags.insert(TAG_LEVEL.to_string(), level.to_string());
        }
    }

    debug!(nodes = game.tree().len(), "decoded binary record");
    Ok(game)
}

/// Reads and decodes a game from `reader`.
pub fn read<R: Read>(mut reader: R) -> Result<GameTree, ParseError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    decode(&bytes)
}
