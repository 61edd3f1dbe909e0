//! A game: one board, one variation tree and a cursor into that tree.
//!
//! Every step from a node to one of its children pushes an [`UndoRecord`]
//! describing exactly what changed on the board, so that stepping back
//! restores the previous position cell for cell.

use crate::board::{Board, Color, Intersection, Mark, MarkKind, Point};
use crate::constants::{DEFAULT_RULES, MAX_HANDICAP};
use crate::error::MoveError;
use crate::info::{GameInfo, GameResult, WinMargin};
use crate::tree::{GameNode, Move, MoveTree, NodeId};

/// Board changes made when entering a node.
#[derive(Clone, Debug)]
struct UndoRecord {
    /// Color of the move, if the node played one.
    mover: Option<Color>,
    /// Point of the played stone and its previous state.
    played: Option<(Point, Intersection)>,
    captured: Vec<Point>,
    captured_color: Color,
    ko_before: Option<Point>,
    /// Intersections replaced by setup stones, in application order.
    overwritten: Vec<(Point, Intersection)>,
}

/// Territory and prisoner counts of a finished position.
#[derive(Clone, Debug, PartialEq)]
pub struct Score {
    pub black_territory: usize,
    pub white_territory: usize,
    /// Stones captured by Black, dead White stones included.
    pub black_prisoners: usize,
    /// Stones captured by White, dead Black stones included.
    pub white_prisoners: usize,
    pub komi: f64,
}

impl Score {
    /// Japanese count: territory plus prisoners.
    pub fn black_total(&self) -> f64 {
        (self.black_territory + self.black_prisoners) as f64
    }

    pub fn white_total(&self) -> f64 {
        (self.white_territory + self.white_prisoners) as f64 + self.komi
    }

    pub fn result(&self) -> GameResult {
        let diff = self.black_total() - self.white_total();
        if diff > 0.0 {
            GameResult::win(Color::Black, WinMargin::Points(diff))
        } else if diff < 0.0 {
            GameResult::win(Color::White, WinMargin::Points(-diff))
        } else {
            GameResult::Draw
        }
    }
}

/// A game in progress or under review.
#[derive(Clone, Debug)]
pub struct GameTree {
    pub info: GameInfo,
    board: Board,
    final_status: Board,
    tree: MoveTree,
    current: NodeId,
    history: Vec<UndoRecord>,
    next_player: Color,
    black_prisoners: usize,
    white_prisoners: usize,
}

impl Default for GameTree {
    fn default() -> Self {
        Self::from_parts(GameInfo::default(), MoveTree::new())
    }
}

impl GameTree {
    /// Creates an empty game. Handicap stones are placed unless the rules
    /// (default Japanese) let Black place them freely; `info.handicap` only
    /// counts stones that are on the board.
    pub fn new(size: usize, komi: f64, handicap: usize, rules: &str) -> Self {
        let mut info = GameInfo::new(size);
        info.komi = komi;
        info.rules = Some(if rules.is_empty() { DEFAULT_RULES } else { rules }.to_string());
        let free = info.has_free_handicap();

        let mut game = Self::from_parts(info, MoveTree::new());
        if !free {
            game.place_handicap(handicap);
        }
        game
    }

    /// Creates a game whose initial position is `board`.
    pub fn with_board(board: &Board, komi: f64) -> Self {
        let size = board.size();
        let mut root = GameNode::default();
        for x in 0..size {
            for y in 0..size {
                if let Some(color) = board.get(x, y).color() {
                    root.set_stone((x, y), Some(color));
                }
            }
        }
        let mut info = GameInfo::new(size);
        info.komi = komi;
        Self::from_parts(info, MoveTree::with_root(root))
    }

    /// Assembles a game from decoded parts, positioned at the root.
    pub fn from_parts(info: GameInfo, tree: MoveTree) -> Self {
        let board = Self::root_position(info.board_size, &tree);
        let mut game = Self {
            final_status: Board::new(info.board_size),
            board,
            current: tree.root(),
            tree,
            history: Vec::new(),
            next_player: Color::Black,
            black_prisoners: 0,
            white_prisoners: 0,
            info,
        };
        game.next_player = game.initial_player();
        game.update_marks();
        game
    }

    fn root_position(size: usize, tree: &MoveTree) -> Board {
        let mut board = Board::new(size);
        let root = tree.node(tree.root());
        if let (Some(Move::Play((x, y))), Some(color)) = (root.mv, root.color) {
            if board.contains(x, y) {
                board.set(x, y, color.into());
            }
        }
        for stone in &root.setup {
            let (x, y) = stone.point;
            if board.contains(x, y) {
                board.place_stone_no_capture(x, y, stone.color.into());
            }
        }
        board
    }

    fn initial_player(&self) -> Color {
        if let Some(color) = self.info.first_player {
            return color;
        }
        let root = self.tree.root();
        if let Some(color) = self
            .tree
            .children(root)
            .first()
            .and_then(|&c| self.tree.node(c).color)
        {
            return color;
        }
        let has_black_setup = self
            .tree
            .node(root)
            .setup
            .iter()
            .any(|s| s.color == Some(Color::Black));
        if self.info.handicap >= 2 && has_black_setup {
            Color::White
        } else {
            Color::Black
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn size(&self) -> usize {
        self.board.size()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Position before any move of the tree, i.e. the root setup.
    pub fn initial_board(&self) -> Board {
        Self::root_position(self.info.board_size, &self.tree)
    }

    pub fn tree(&self) -> &MoveTree {
        &self.tree
    }

    pub fn current(&self) -> NodeId {
        self.current
    }

    pub fn current_node(&self) -> &GameNode {
        self.tree.node(self.current)
    }

    pub fn next_player(&self) -> Color {
        self.next_player
    }

    pub fn set_next_player(&mut self, color: Color) {
        self.next_player = color;
    }

    pub fn switch_player(&mut self) {
        self.next_player = self.next_player.opponent();
    }

    /// Stones captured by Black so far.
    pub fn black_prisoners(&self) -> usize {
        self.black_prisoners
    }

    /// Stones captured by White so far.
    pub fn white_prisoners(&self) -> usize {
        self.white_prisoners
    }

    /// Number of nodes between the root and the cursor.
    pub fn move_number(&self) -> usize {
        self.history.len()
    }

    /// Stones captured by the node under the cursor.
    pub fn last_prisoners(&self) -> usize {
        self.history.last().map_or(0, |r| r.captured.len())
    }

    pub fn is_finished(&self) -> bool {
        self.info.result.is_some()
    }

    /// True if the last two moves were passes.
    pub fn has_two_passes(&self) -> bool {
        let node = self.current_node();
        node.mv == Some(Move::Pass)
            && node
                .parent()
                .is_some_and(|p| self.tree.node(p).mv == Some(Move::Pass))
    }

    /// Moves from the root to the cursor, in order.
    pub fn moves_to_current(&self) -> Vec<(Color, Move)> {
        self.tree
            .path_to(self.current)
            .into_iter()
            .filter_map(|id| {
                let node = self.tree.node(id);
                Some((node.color?, node.mv?))
            })
            .collect()
    }

    // =========================================================================
    // Playing
    // =========================================================================

    /// Checks a move without playing it.
    pub fn check_move(&mut self, x: usize, y: usize, color: Color) -> Result<(), MoveError> {
        self.board.check_legal(x, y, color)
    }

    pub fn is_legal(&mut self, x: usize, y: usize, color: Color) -> bool {
        self.check_move(x, y, color).is_ok()
    }

    /// Plays a move if it is legal; an illegal move leaves the game untouched.
    pub fn try_play(&mut self, x: usize, y: usize, color: Color) -> Result<(), MoveError> {
        self.check_move(x, y, color)?;
        self.place_move(Move::Play((x, y)), color);
        Ok(())
    }

    /// Plays a move and reports whether it was legal.
    pub fn play_move(&mut self, x: usize, y: usize, color: Color) -> bool {
        self.try_play(x, y, color).is_ok()
    }

    /// Plays a move for the player to move.
    pub fn play(&mut self, x: usize, y: usize) -> bool {
        self.play_move(x, y, self.next_player)
    }

    pub fn pass(&mut self) {
        self.place_move(Move::Pass, self.next_player);
    }

    /// Ends the game with `color` resigning.
    pub fn resign(&mut self, color: Color) {
        self.info.result = Some(GameResult::win(color.opponent(), WinMargin::Resign));
    }

    /// Plays a move without checking its legality. A point outside the
    /// board is played as a pass.
    pub fn place_move(&mut self, mv: Move, color: Color) {
        let mv = match mv {
            Move::Play((x, y)) if !self.board.contains(x, y) => Move::Pass,
            other => other,
        };
        let child = self.tree.add_child(self.current, color, mv);
        self.enter(child);
    }

    /// Applies `child` (a child of the cursor) to the board and moves the cursor there.
    fn enter(&mut self, child: NodeId) {
        let node = self.tree.node(child);
        let (mv, color) = (node.mv, node.color);

        let mut record = UndoRecord {
            mover: color.filter(|_| mv.is_some()),
            played: None,
            captured: Vec::new(),
            captured_color: Color::Black,
            ko_before: self.board.ko(),
            overwritten: Vec::new(),
        };
        self.board.set_ko(None);

        if let (Some(Move::Play((x, y))), Some(color)) = (mv, color) {
            if self.board.contains(x, y) {
                record.played = Some(((x, y), self.board.get(x, y)));
                let captured = self.board.place_move(x, y, color);
                self.board.update_ko(&captured, color);
                match color {
                    Color::Black => self.black_prisoners += captured.len(),
                    Color::White => self.white_prisoners += captured.len(),
                }
                record.captured = captured;
                record.captured_color = color.opponent();
            }
        }

        if let Some(index) = self.tree.child_index(child) {
            self.tree.node_mut(self.current).last_variation = index;
        }
        self.current = child;
        record.overwritten = self.apply_setup(child);
        self.history.push(record);

        if let Some(color) = color.filter(|_| mv.is_some()) {
            self.next_player = color.opponent();
        }
        self.update_marks();
    }

    fn apply_setup(&mut self, id: NodeId) -> Vec<(Point, Intersection)> {
        let stones = self.tree.node(id).setup.clone();
        let mut overwritten = Vec::with_capacity(stones.len());
        for stone in stones {
            let (x, y) = stone.point;
            if self.board.contains(x, y) {
                overwritten.push(((x, y), self.board.get(x, y)));
                self.board.place_stone_no_capture(x, y, stone.color.into());
            }
        }
        overwritten
    }

    /// Steps back to the parent of the cursor, optionally removing the node
    /// (and its subtree) from the tree. Returns the node that was left, or
    /// `None` at the root.
    pub fn undo(&mut self, remove_from_tree: bool) -> Option<NodeId> {
        let node = self.current;
        let parent = self.tree.parent(node)?;
        let record = self.history.pop()?;

        for &((x, y), state) in record.overwritten.iter().rev() {
            self.board.set(x, y, state);
        }
        if let Some(((x, y), state)) = record.played {
            self.board.set(x, y, state);
        }
        let restored = Intersection::from(record.captured_color);
        for &(x, y) in &record.captured {
            self.board.set(x, y, restored);
        }
        let count = record.captured.len();
        match record.captured_color {
            Color::White => self.black_prisoners = self.black_prisoners.saturating_sub(count),
            Color::Black => self.white_prisoners = self.white_prisoners.saturating_sub(count),
        }
        self.board.set_ko(record.ko_before);

        self.current = parent;
        if remove_from_tree {
            self.tree.detach(node);
        }
        if let Some(color) = record.mover {
            self.next_player = color;
        }
        self.update_marks();
        Some(node)
    }

    /// Removes the node under the cursor with its subtree, or every move when
    /// the cursor is at the root.
    pub fn delete_move(&mut self) {
        if self.current == self.tree.root() {
            self.clear();
        } else {
            self.undo(true);
        }
    }

    /// Removes every move, keeping the initial position.
    pub fn clear(&mut self) {
        let root = self.tree.node(self.tree.root()).clone();
        self.tree = MoveTree::with_root(root);
        self.current = self.tree.root();
        self.history.clear();
        self.board = Self::root_position(self.info.board_size, &self.tree);
        self.final_status = Board::new(self.info.board_size);
        self.black_prisoners = 0;
        self.white_prisoners = 0;
        self.next_player = self.initial_player();
        self.update_marks();
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Moves `steps` nodes forward (following the last variation taken at each
    /// branch) or backward. Returns the number of steps actually taken.
    pub fn navigate(&mut self, steps: isize) -> usize {
        let wanted = steps.unsigned_abs();
        let mut taken = 0;
        if steps > 0 {
            while taken < wanted {
                let node = self.tree.node(self.current);
                let children = node.children();
                let Some(&child) = children.get(node.last_variation).or(children.first()) else {
                    break;
                };
                self.enter(child);
                taken += 1;
            }
        } else {
            while taken < wanted && self.undo(false).is_some() {
                taken += 1;
            }
        }
        taken
    }

    pub fn goto_first_move(&mut self) {
        self.navigate(isize::MIN);
    }

    pub fn goto_last_move(&mut self) {
        self.navigate(isize::MAX);
    }

    /// Moves the cursor to `id`, replaying the path from the root.
    pub fn goto_node(&mut self, id: NodeId) {
        self.goto_first_move();
        for step in self.tree.path_to(id) {
            self.enter(step);
        }
    }

    pub fn goto_next_variation(&mut self) {
        self.cycle_variation(true);
    }

    pub fn goto_previous_variation(&mut self) {
        self.cycle_variation(false);
    }

    fn cycle_variation(&mut self, forward: bool) {
        let Some(parent) = self.tree.parent(self.current) else {
            return;
        };
        let count = self.tree.children(parent).len();
        let Some(index) = self.tree.child_index(self.current) else {
            return;
        };
        if count < 2 {
            return;
        }
        let target_index = if forward {
            (index + 1) % count
        } else {
            (index + count - 1) % count
        };
        let target = self.tree.children(parent)[target_index];
        self.undo(false);
        self.enter(target);
    }

    // =========================================================================
    // Annotations
    // =========================================================================

    /// Sets the problem value of the current node (0 = wrong, 100 = right, -1 = unset).
    pub fn set_move_value(&mut self, value: i8) {
        self.tree.set_move_value(self.current, value);
    }

    pub fn set_comment(&mut self, comment: &str) {
        self.tree.node_mut(self.current).comment = comment.to_string();
    }

    pub fn add_mark(&mut self, mark: Mark) {
        self.tree.node_mut(self.current).add_mark(mark);
        self.update_marks();
    }

    /// Adds a setup stone (or clears a point with `None`) on the current node.
    /// No capture is resolved.
    pub fn add_stone(&mut self, x: usize, y: usize, color: Option<Color>) {
        if !self.board.contains(x, y) {
            return;
        }
        self.tree.node_mut(self.current).set_stone((x, y), color);
        let prior = self.board.get(x, y);
        self.board.place_stone_no_capture(x, y, color.into());
        if let Some(record) = self.history.last_mut() {
            record.overwritten.push(((x, y), prior));
        }
    }

    /// Rebuilds the display marks: last move, ko point, then the node's own marks.
    fn update_marks(&mut self) {
        self.board.clear_marks();
        let node = self.tree.node(self.current);
        if let Some(Move::Play((x, y))) = node.mv {
            if self.board.contains(x, y) {
                self.board.set_mark(Mark::new(x, y, MarkKind::Circle));
            }
        }
        if let Some((x, y)) = self.board.ko() {
            self.board.set_mark(Mark::new(x, y, MarkKind::Square));
        }
        for &mark in &node.marks {
            self.board.set_mark(mark);
        }
    }

    // =========================================================================
    // Handicap and rotation
    // =========================================================================

    /// Places `handicap` stones on the star points and gives White the move.
    /// Nothing is placed on even board sizes or for fewer than two stones.
    pub fn place_handicap(&mut self, handicap: usize) {
        let size = self.size();
        if handicap <= 1 || size % 2 == 0 {
            return;
        }
        let handicap = handicap.min(MAX_HANDICAP);

        let shift = usize::from(size > 12);
        let low = 2 + shift;
        let mid = size / 2;
        let high = size - 3 - shift;

        let mut points = Vec::with_capacity(handicap);
        if handicap >= 8 {
            points.extend([(mid, low), (mid, high)]);
        }
        if handicap >= 6 {
            points.extend([(low, mid), (high, mid)]);
        }
        if handicap >= 4 {
            points.push((high, high));
        }
        if handicap >= 3 {
            points.push((low, low));
        }
        points.extend([(low, high), (high, low)]);
        if handicap % 2 == 1 && handicap >= 5 {
            points.push((mid, mid));
        }

        for (x, y) in points {
            self.add_stone(x, y, Some(Color::Black));
        }
        self.next_player = Color::White;
        self.info.handicap = handicap;
    }

    /// Rotates the whole game by 90° counter-clockwise.
    pub fn rotate_ccw(&mut self) {
        let size = self.size();
        let rotate = |p: Point| Board::rotate_point_ccw(size, p);

        self.board.rotate_ccw();
        self.final_status.rotate_ccw();
        self.tree.rotate_ccw(size);
        for record in &mut self.history {
            record.played = record.played.map(|(p, state)| (rotate(p), state));
            for p in &mut record.captured {
                *p = rotate(*p);
            }
            record.ko_before = record.ko_before.map(rotate);
            for (p, _) in &mut record.overwritten {
                *p = rotate(*p);
            }
        }
        self.update_marks();
    }

    // =========================================================================
    // Scoring
    // =========================================================================

    pub fn final_status(&self, x: usize, y: usize) -> Intersection {
        self.final_status.get(x, y)
    }

    pub fn final_status_board(&self) -> &Board {
        &self.final_status
    }

    pub fn set_final_status(&mut self, x: usize, y: usize, status: Intersection) {
        self.final_status.set(x, y, status);
    }

    pub fn reset_final_status(&mut self) {
        self.final_status = Board::new(self.size());
    }

    /// Marks the group on `(x, y)` as dead, or alive again if it already was.
    pub fn toggle_dead_group(&mut self, x: usize, y: usize) {
        let dead = match self.board.get(x, y) {
            Intersection::Black => Intersection::DeadBlack,
            Intersection::White => Intersection::DeadWhite,
            _ => return,
        };
        for (gx, gy) in self.board.group_stones(x, y) {
            let status = if self.final_status.get(gx, gy) == dead {
                Intersection::Empty
            } else {
                dead
            };
            self.final_status.set(gx, gy, status);
        }
    }

    /// Counts territory and prisoners, treating groups flagged dead on the
    /// final status board as captured. Territory found is written back to
    /// the final status board.
    pub fn compute_territory(&mut self) -> Score {
        let size = self.size();
        let mut score = Score {
            black_territory: 0,
            white_territory: 0,
            black_prisoners: self.black_prisoners,
            white_prisoners: self.white_prisoners,
            komi: self.info.komi,
        };

        let mut position = self.board.clone();
        position.clear_marks();
        for y in 0..size {
            for x in 0..size {
                match self.final_status.get(x, y) {
                    Intersection::BlackTerritory | Intersection::WhiteTerritory => {
                        self.final_status.set(x, y, Intersection::Empty);
                    }
                    Intersection::DeadBlack if position.get(x, y) == Intersection::Black => {
                        score.white_prisoners += position.remove_group(x, y).len();
                    }
                    Intersection::DeadWhite if position.get(x, y) == Intersection::White => {
                        score.black_prisoners += position.remove_group(x, y).len();
                    }
                    _ => {}
                }
            }
        }

        let mut visited = vec![false; size * size];
        for start in 0..size * size {
            if visited[start] || position.cells()[start] != Intersection::Empty {
                continue;
            }
            let (region, borders) = empty_region(&position, start, &mut visited);
            let owner = match borders {
                (true, false) => Color::Black,
                (false, true) => Color::White,
                _ => continue,
            };
            let territory = match owner {
                Color::Black => {
                    score.black_territory += region.len();
                    Intersection::BlackTerritory
                }
                Color::White => {
                    score.white_territory += region.len();
                    Intersection::WhiteTerritory
                }
            };
            for (x, y) in region {
                if self.final_status.get(x, y) == Intersection::Empty {
                    self.final_status.set(x, y, territory);
                }
            }
        }
        score
    }
}

/// Flood-fills the empty region containing cell `start`. Returns its points
/// and whether it touches black and white stones.
fn empty_region(board: &Board, start: usize, visited: &mut [bool]) -> (Vec<Point>, (bool, bool)) {
    let size = board.size();
    let mut region = Vec::new();
    let (mut black, mut white) = (false, false);
    let mut stack = vec![(start % size, start / size)];
    visited[start] = true;

    while let Some((x, y)) = stack.pop() {
        region.push((x, y));
        for (nx, ny) in Board::neighbors(size, x, y) {
            match board.get(nx, ny) {
                Intersection::Black => black = true,
                Intersection::White => white = true,
                _ => {
                    let i = ny * size + nx;
                    if !visited[i] {
                        visited[i] = true;
                        stack.push((nx, ny));
                    }
                }
            }
        }
    }
    (region, (black, white))
}
