//! Go board: a square grid of intersections with capture, liberty and ko primitives.
//!
//! Coordinates are zero-based `(x, y)` pairs with `(0, 0)` in the top-left
//! corner. Group traversals are iterative flood-fills guarded by a visited
//! array, so they never recurse regardless of group shape.

use std::fmt;

use crate::error::MoveError;

/// A stone color.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Color {
    Black,
    White,
}

impl Color {
    /// The other color.
    pub fn opponent(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }
}

/// A point on the board.
pub type Point = (usize, usize);

/// State of a single intersection.
///
/// The territory and dead-stone states only appear on scoring boards.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Intersection {
    #[default]
    Empty,
    Black,
    White,
    BlackTerritory,
    WhiteTerritory,
    DeadBlack,
    DeadWhite,
}

impl Intersection {
    /// Color of the stone on this intersection, if any.
    pub fn color(self) -> Option<Color> {
        match self {
            Intersection::Black => Some(Color::Black),
            Intersection::White => Some(Color::White),
            _ => None,
        }
    }

    pub fn is_stone(self) -> bool {
        self.color().is_some()
    }
}

impl From<Color> for Intersection {
    fn from(color: Color) -> Self {
        match color {
            Color::Black => Intersection::Black,
            Color::White => Intersection::White,
        }
    }
}

impl From<Option<Color>> for Intersection {
    fn from(color: Option<Color>) -> Self {
        color.map_or(Intersection::Empty, Intersection::from)
    }
}

/// Shape of a display mark.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MarkKind {
    Triangle,
    Circle,
    Square,
    Cross,
    WhiteTerritory,
    BlackTerritory,
    Label(char),
}

impl MarkKind {
    /// Numeric code used by the binary format.
    pub fn code(self) -> u8 {
        match self {
            MarkKind::Triangle => 1,
            MarkKind::Circle => 2,
            MarkKind::Square => 3,
            MarkKind::Cross => 4,
            MarkKind::WhiteTerritory => 5,
            MarkKind::BlackTerritory => 6,
            MarkKind::Label(_) => 9,
        }
    }

    /// Inverse of [`MarkKind::code`]. Labels have no text in the binary format
    /// and are therefore not decodable.
    pub fn from_code(code: u8) -> Option<MarkKind> {
        match code {
            1 => Some(MarkKind::Triangle),
            2 => Some(MarkKind::Circle),
            3 => Some(MarkKind::Square),
            4 => Some(MarkKind::Cross),
            5 => Some(MarkKind::WhiteTerritory),
            6 => Some(MarkKind::BlackTerritory),
            _ => None,
        }
    }
}

/// A mark displayed on an intersection. Opaque to the rules.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Mark {
    pub point: Point,
    pub kind: MarkKind,
}

impl Mark {
    pub fn new(x: usize, y: usize, kind: MarkKind) -> Self {
        Self { point: (x, y), kind }
    }
}

/// Inclusive rectangle of intersections.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Rect {
    pub left: usize,
    pub top: usize,
    pub right: usize,
    pub bottom: usize,
}

impl Rect {
    /// Smallest rectangle containing every point, or `None` for no points.
    pub fn enclosing(points: impl IntoIterator<Item = Point>) -> Option<Rect> {
        let mut rect: Option<Rect> = None;
        for (x, y) in points {
            rect = Some(match rect {
                None => Rect {
                    left: x,
                    top: y,
                    right: x,
                    bottom: y,
                },
                Some(r) => Rect {
                    left: r.left.min(x),
                    top: r.top.min(y),
                    right: r.right.max(x),
                    bottom: r.bottom.max(y),
                },
            });
        }
        rect
    }

    pub fn width(&self) -> usize {
        self.right - self.left + 1
    }

    pub fn height(&self) -> usize {
        self.bottom - self.top + 1
    }

    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    pub fn contains(&self, (x, y): Point) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }
}

/// A square Go board.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    size: usize,
    cells: Vec<Intersection>,
    /// Point the next player may not play on because of a ko.
    ko: Option<Point>,
    marks: Vec<Mark>,
}

impl Board {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![Intersection::Empty; size * size],
            ko: None,
            marks: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn idx(&self, x: usize, y: usize) -> usize {
        y * self.size + x
    }

    /// True if `(x, y)` lies on the board.
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x < self.size && y < self.size
    }

    /// State of an intersection.
    ///
    /// # Panics
    /// Panics if `(x, y)` is outside the board.
    pub fn get(&self, x: usize, y: usize) -> Intersection {
        self.cells[self.idx(x, y)]
    }

    pub fn set(&mut self, x: usize, y: usize, state: Intersection) {
        let i = self.idx(x, y);
        self.cells[i] = state;
    }

    /// Row-major intersection states (`y * size + x`).
    pub fn cells(&self) -> &[Intersection] {
        &self.cells
    }

    /// True if no stone sits on the intersection.
    pub fn is_empty_at(&self, x: usize, y: usize) -> bool {
        !self.get(x, y).is_stone()
    }

    pub fn ko(&self) -> Option<Point> {
        self.ko
    }

    pub fn set_ko(&mut self, ko: Option<Point>) {
        self.ko = ko;
    }

    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    pub fn mark_at(&self, x: usize, y: usize) -> Option<&Mark> {
        self.marks.iter().find(|m| m.point == (x, y))
    }

    /// Sets a mark, replacing any mark already on that intersection.
    pub fn set_mark(&mut self, mark: Mark) {
        self.marks.retain(|m| m.point != mark.point);
        self.marks.push(mark);
    }

    pub fn clear_marks(&mut self) {
        self.marks.clear();
    }

    /// Removes every stone, mark and the ko.
    pub fn clear(&mut self) {
        self.marks.clear();
        self.ko = None;
        self.fill(Intersection::Empty);
    }

    pub fn fill(&mut self, state: Intersection) {
        self.cells.fill(state);
    }

    /// Swaps black and white stones.
    pub fn reverse_colors(&mut self) {
        for c in &mut self.cells {
            *c = match *c {
                Intersection::Black => Intersection::White,
                Intersection::White => Intersection::Black,
                other => other,
            };
        }
    }

    pub fn neighbors(size: usize, x: usize, y: usize) -> impl Iterator<Item = Point> {
        [
            (x.wrapping_sub(1), y),
            (x + 1, y),
            (x, y.wrapping_sub(1)),
            (x, y + 1),
        ]
        .into_iter()
        .filter(move |&(nx, ny)| nx < size && ny < size)
    }

    /// Checks whether `color` may play at `(x, y)`.
    pub fn check_legal(&mut self, x: usize, y: usize, color: Color) -> Result<(), MoveError> {
        if !self.contains(x, y) {
            return Err(MoveError::OutOfBounds);
        }
        if self.get(x, y) != Intersection::Empty {
            return Err(MoveError::Occupied);
        }

        self.set(x, y, color.into());
        let mut result = Ok(());
        if !self.has_liberty(x, y) {
            let opp = Intersection::from(color.opponent());
            let captures = Self::neighbors(self.size, x, y)
                .any(|(nx, ny)| self.get(nx, ny) == opp && !self.has_liberty(nx, ny));
            result = if !captures {
                Err(MoveError::Suicide)
            } else if self.ko == Some((x, y)) {
                Err(MoveError::Ko)
            } else {
                Ok(())
            };
        }
        self.set(x, y, Intersection::Empty);
        result
    }

    /// Returns true if `color` may play at `(x, y)`. The board is left unchanged.
    pub fn is_legal(&mut self, x: usize, y: usize, color: Color) -> bool {
        self.check_legal(x, y, color).is_ok()
    }

    /// Puts a stone on the board and removes every adjacent enemy group left
    /// without liberties. Returns the captured intersections. Legality is not checked.
    pub fn place_move(&mut self, x: usize, y: usize, color: Color) -> Vec<Point> {
        self.set(x, y, color.into());

        let opp = Intersection::from(color.opponent());
        let mut captured = Vec::new();
        for (nx, ny) in Self::neighbors(self.size, x, y) {
            if self.get(nx, ny) == opp && !self.has_liberty(nx, ny) {
                captured.extend(self.remove_group(nx, ny));
            }
        }
        captured
    }

    /// Puts a stone (or clears a point) without resolving captures.
    pub fn place_stone_no_capture(&mut self, x: usize, y: usize, state: Intersection) {
        self.set(x, y, state);
    }

    /// Sets the ko point after `color` played a move that captured `captured`.
    ///
    /// A ko exists only if exactly one stone was captured and retaking it
    /// would itself capture exactly one stone. The retake is tested on the
    /// live cells, which are restored afterwards.
    pub fn update_ko(&mut self, captured: &[Point], color: Color) {
        self.ko = None;
        if let [prisoner] = captured {
            let snapshot = self.cells.clone();
            let retaken = self.place_move(prisoner.0, prisoner.1, color.opponent());
            self.cells = snapshot;
            if retaken.len() == 1 {
                self.ko = Some(*prisoner);
            }
        }
    }

    /// Returns true if the group on `(x, y)` has at least one liberty.
    /// An empty intersection has none.
    pub fn has_liberty(&self, x: usize, y: usize) -> bool {
        let Some(color) = self.get(x, y).color() else {
            return false;
        };
        let target = Intersection::from(color);
        let mut visited = vec![false; self.cells.len()];
        let mut stack = vec![(x, y)];
        visited[self.idx(x, y)] = true;

        while let Some((cx, cy)) = stack.pop() {
            for (nx, ny) in Self::neighbors(self.size, cx, cy) {
                let state = self.get(nx, ny);
                if state == Intersection::Empty {
                    return true;
                }
                let ni = self.idx(nx, ny);
                if state == target && !visited[ni] {
                    visited[ni] = true;
                    stack.push((nx, ny));
                }
            }
        }
        false
    }

    /// Color of the stones around an empty point if every on-board neighbor
    /// holds a stone of that same color. Such a point may still be a false eye.
    pub fn is_eyeish(&self, x: usize, y: usize) -> Option<Color> {
        let mut eye = None;
        for (nx, ny) in Self::neighbors(self.size, x, y) {
            let color = self.get(nx, ny).color()?;
            match eye {
                None => eye = Some(color),
                Some(c) if c != color => return None,
                Some(_) => {}
            }
        }
        eye
    }

    /// Lists the stones of the group on `(x, y)`. Empty if the point is empty.
    pub fn group_stones(&self, x: usize, y: usize) -> Vec<Point> {
        let state = self.get(x, y);
        if state == Intersection::Empty {
            return Vec::new();
        }
        let mut visited = vec![false; self.cells.len()];
        let mut stack = vec![(x, y)];
        let mut group = Vec::new();
        visited[self.idx(x, y)] = true;

        while let Some((cx, cy)) = stack.pop() {
            group.push((cx, cy));
            for (nx, ny) in Self::neighbors(self.size, cx, cy) {
                let ni = self.idx(nx, ny);
                if !visited[ni] && self.get(nx, ny) == state {
                    visited[ni] = true;
                    stack.push((nx, ny));
                }
            }
        }
        group
    }

    /// Removes the group on `(x, y)` and returns its stones.
    pub fn remove_group(&mut self, x: usize, y: usize) -> Vec<Point> {
        let group = self.group_stones(x, y);
        for &(gx, gy) in &group {
            self.set(gx, gy, Intersection::Empty);
        }
        group
    }

    /// Maps a point through a 90° counter-clockwise rotation.
    pub fn rotate_point_ccw(size: usize, (x, y): Point) -> Point {
        (y, size - x - 1)
    }

    /// Rotates the stones, the ko point and the marks by 90° counter-clockwise.
    pub fn rotate_ccw(&mut self) {
        let old = self.cells.clone();
        for y in 0..self.size {
            for x in 0..self.size {
                let (rx, ry) = Self::rotate_point_ccw(self.size, (x, y));
                self.set(rx, ry, old[y * self.size + x]);
            }
        }
        let size = self.size;
        self.ko = self.ko.map(|p| Self::rotate_point_ccw(size, p));
        for mark in &mut self.marks {
            mark.point = Self::rotate_point_ccw(size, mark.point);
        }
    }

    /// Smallest rectangle containing every stone, or `None` on an empty board.
    pub fn bounds(&self) -> Option<Rect> {
        let size = self.size;
        Rect::enclosing(
            self.cells
                .iter()
                .enumerate()
                .filter(|(_, c)| c.is_stone())
                .map(|(i, _)| (i % size, i / size)),
        )
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..self.size {
            for x in 0..self.size {
                let ch = match self.get(x, y) {
                    Intersection::Black => 'X',
                    Intersection::White => 'O',
                    Intersection::BlackTerritory => 'b',
                    Intersection::WhiteTerritory => 'w',
                    Intersection::DeadBlack => 'x',
                    Intersection::DeadWhite => 'o',
                    Intersection::Empty if self.ko == Some((x, y)) => '#',
                    Intersection::Empty => '.',
                };
                write!(f, "{ch} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_with(size: usize, black: &[Point], white: &[Point]) -> Board {
        let mut board = Board::new(size);
        for &(x, y) in black {
            board.set(x, y, Intersection::Black);
        }
        for &(x, y) in white {
            board.set(x, y, Intersection::White);
        }
        board
    }

    #[test]
    fn test_single_stone_capture() {
        let mut board = board_with(9, &[(4, 4)], &[(3, 4), (5, 4), (4, 3)]);
        assert!(board.is_legal(4, 5, Color::White));
        let captured = board.place_move(4, 5, Color::White);
        assert_eq!(captured, vec![(4, 4)]);
        assert_eq!(board.get(4, 4), Intersection::Empty);
    }

    #[test]
    fn test_corner_suicide_is_illegal() {
        let mut board = board_with(9, &[(1, 0), (0, 1)], &[]);
        assert_eq!(board.check_legal(0, 0, Color::White), Err(MoveError::Suicide));
        assert_eq!(board.get(0, 0), Intersection::Empty, "legality check must not mutate");
        assert!(board.is_legal(0, 0, Color::Black));
    }

    #[test]
    fn test_occupied_and_out_of_bounds() {
        let mut board = board_with(5, &[(2, 2)], &[]);
        assert_eq!(board.check_legal(2, 2, Color::White), Err(MoveError::Occupied));
        assert_eq!(board.check_legal(5, 0, Color::White), Err(MoveError::OutOfBounds));
    }

    #[test]
    fn test_suicide_allowed_when_capturing() {
        let mut board = board_with(
            9,
            &[(1, 0), (1, 1)],
            &[(0, 0), (2, 0), (2, 1), (1, 2), (0, 2)],
        );
        // Black at (0,1) has no liberty of its own but captures the corner stone.
        assert!(board.is_legal(0, 1, Color::Black));
        let captured = board.place_move(0, 1, Color::Black);
        assert_eq!(captured, vec![(0, 0)]);
        assert!(board.has_liberty(0, 1));
    }

    #[test]
    fn test_ko_detection_and_enforcement() {
        // Classic ko shape around (2,1)/(3,1).
        //   . X O .
        //   X O . O
        //   . X O .
        let mut board = board_with(
            6,
            &[(1, 0), (0, 1), (1, 2)],
            &[(2, 0), (1, 1), (3, 1), (2, 2)],
        );
        let captured = board.place_move(2, 1, Color::Black);
        assert_eq!(captured, vec![(1, 1)]);
        board.update_ko(&captured, Color::Black);
        assert_eq!(board.ko(), Some((1, 1)));
        assert_eq!(board.check_legal(1, 1, Color::White), Err(MoveError::Ko));
        // The tentative retake must not have altered the position.
        assert_eq!(board.get(2, 1), Intersection::Black);
        assert_eq!(board.get(1, 1), Intersection::Empty);
    }

    #[test]
    fn test_no_ko_for_multi_stone_recapture() {
        // Black captures one stone, but retaking would capture two black stones.
        let mut board = board_with(
            7,
            &[(1, 0), (0, 1), (1, 2), (3, 1)],
            &[(1, 1), (2, 0), (2, 2), (3, 0), (3, 2), (4, 1)],
        );
        let captured = board.place_move(2, 1, Color::Black);
        assert_eq!(captured, vec![(1, 1)]);
        board.update_ko(&captured, Color::Black);
        assert_eq!(board.ko(), None);
    }

    #[test]
    fn test_has_liberty_on_ring_group() {
        // A ring of black stones enclosing a white stone: cycles in the group graph.
        let ring = [(1, 1), (2, 1), (3, 1), (1, 2), (3, 2), (1, 3), (2, 3), (3, 3)];
        let board = board_with(5, &ring, &[(2, 2)]);
        assert!(board.has_liberty(1, 1));
        assert!(!board.has_liberty(2, 2));
        assert!(!board.has_liberty(0, 0), "empty point has no liberty");
    }

    #[test]
    fn test_remove_group() {
        let mut board = board_with(5, &[(0, 0), (1, 0), (1, 1)], &[(3, 3)]);
        let mut removed = board.remove_group(1, 0);
        removed.sort();
        assert_eq!(removed, vec![(0, 0), (1, 0), (1, 1)]);
        assert_eq!(board.get(3, 3), Intersection::White);
        assert!(board.bounds().is_some());
    }

    #[test]
    fn test_rotate_ccw() {
        let mut board = board_with(5, &[(0, 0)], &[(4, 1)]);
        board.set_mark(Mark::new(4, 1, MarkKind::Triangle));
        board.set_ko(Some((2, 0)));
        board.rotate_ccw();
        assert_eq!(board.get(0, 4), Intersection::Black);
        assert_eq!(board.get(1, 0), Intersection::White);
        assert_eq!(board.marks()[0].point, (1, 0));
        assert_eq!(board.ko(), Some((0, 2)));

        for _ in 0..3 {
            board.rotate_ccw();
        }
        assert_eq!(board.get(0, 0), Intersection::Black);
        assert_eq!(board.get(4, 1), Intersection::White);
    }

    #[test]
    fn test_bounds() {
        assert_eq!(Board::new(9).bounds(), None);
        let board = board_with(9, &[(2, 5), (6, 1)], &[(3, 3)]);
        let rect = board.bounds().unwrap();
        assert_eq!(
            rect,
            Rect {
                left: 2,
                top: 1,
                right: 6,
                bottom: 5
            }
        );
        assert_eq!(rect.area(), 25);
    }

    #[test]
    fn test_set_mark_replaces() {
        let mut board = Board::new(9);
        board.set_mark(Mark::new(1, 1, MarkKind::Circle));
        board.set_mark(Mark::new(1, 1, MarkKind::Label('A')));
        assert_eq!(board.marks().len(), 1);
        assert_eq!(board.mark_at(1, 1).unwrap().kind, MarkKind::Label('A'));
    }

    #[test]
    fn test_is_eyeish() {
        // Corner eye of Black at (0,0); mixed neighbors at (4,4)
        let board = board_with(9, &[(1, 0), (0, 1), (3, 4), (4, 3)], &[(5, 4)]);
        assert_eq!(board.is_eyeish(0, 0), Some(Color::Black));
        assert_eq!(board.is_eyeish(4, 4), None);
        assert_eq!(board.is_eyeish(7, 7), None, "empty neighbors make no eye");
    }
}
