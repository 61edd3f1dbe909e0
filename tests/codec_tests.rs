//! Integration tests for the SGF and LRF codecs.

use std::fs::File;
use std::io::BufReader;

use kifu::board::{Color, Intersection, Mark, MarkKind};
use kifu::game::GameTree;
use kifu::lrf;
use kifu::sgf::{self, ParseOptions, WriteStyle};
use kifu::tree::{Move, SetupStone};

// =============================================================================
// Helper functions
// =============================================================================

type NodeShape = (Option<Move>, Option<Color>, Vec<SetupStone>, Vec<Mark>, String, usize);

/// Everything a node carries that both directions of the SGF codec keep,
/// in pre-order.
fn shape(game: &GameTree) -> Vec<NodeShape> {
    let tree = game.tree();
    tree.preorder()
        .into_iter()
        .map(|id| {
            let node = tree.node(id);
            (
                node.mv,
                node.color,
                node.setup.clone(),
                node.marks.clone(),
                node.comment.clone(),
                tree.children(id).len(),
            )
        })
        .collect()
}

/// Moves, colors and branching only.
fn moves(game: &GameTree) -> Vec<(Option<Move>, Option<Color>, usize)> {
    let tree = game.tree();
    tree.preorder()
        .into_iter()
        .map(|id| (tree.node(id).mv, tree.node(id).color, tree.children(id).len()))
        .collect()
}

fn parse_one(text: &str) -> GameTree {
    let mut games = sgf::parse(text).unwrap();
    assert_eq!(games.len(), 1);
    games.remove(0)
}

const RICH_GAME: &str = r"(;GM[1]FF[4]SZ[9]KM[0.5]HA[2]RU[Japanese]
PB[Black Player]PW[White Player]BR[3d]WR[5k]RE[W+2.5]PL[W]
EV[Club]DT[2024-05-01]RO[3]PC[Home]GN[Test]
AB[gc][cg]TR[ee]C[Handicap \] game]
;W[ef]CR[ef]LB[cc:A][dd:B]
(;B[de]SQ[de]MA[dd];W[ce]C[main line])
(;B[fe]AE[gc]TB[aa]TW[ii]))";

// =============================================================================
// SGF
// =============================================================================

#[test]
fn test_sgf_round_trip_keeps_tree_and_metadata() {
    let game = parse_one(RICH_GAME);
    assert_eq!(game.info.black_rank.as_deref(), Some("3d"));
    assert_eq!(game.info.first_player, Some(Color::White));
    assert_eq!(game.next_player(), Color::White);
    assert_eq!(game.board().get(6, 2), Intersection::Black);
    assert_eq!(game.current_node().comment, "Handicap ] game");

    for style in [WriteStyle::Compact, WriteStyle::Pretty] {
        let text = sgf::to_string(&game, style);
        let again = parse_one(&text);
        assert_eq!(shape(&again), shape(&game), "tree changed with {style:?}");

        let mut info = again.info.clone();
        if style == WriteStyle::Pretty {
            assert!(info.application.as_deref().is_some_and(|ap| ap.starts_with("kifu:")));
            info.application = None;
        }
        assert_eq!(info, game.info, "metadata changed with {style:?}");
    }
}

#[test]
fn test_sgf_files_read_and_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("game.sgf");
    let game = parse_one(RICH_GAME);
    sgf::write(&game, WriteStyle::Pretty, File::create(&path).unwrap()).unwrap();

    let games = sgf::read(BufReader::new(File::open(&path).unwrap()), &ParseOptions::default()).unwrap();
    assert_eq!(games.len(), 1);
    assert_eq!(shape(&games[0]), shape(&game));
}

#[test]
fn test_sgf_handles_very_deep_trees() {
    let depth = 20_000;
    let mut text = String::from("(;SZ[9]");
    for i in 0..depth {
        text.push_str(if i % 2 == 0 { ";B[]" } else { ";W[]" });
    }
    text.push(')');

    let game = parse_one(&text);
    assert_eq!(game.tree().main_line().len(), depth);

    let again = parse_one(&sgf::to_string(&game, WriteStyle::Compact));
    assert_eq!(again.tree().len(), game.tree().len());
}

#[test]
fn test_sgf_failures_return_no_game() {
    for text in ["(;SZ[9];B[aa]", "(;SZ[9]C[never closed", "(;SZ[9];B[zz])", ")(;B[aa])"] {
        assert!(sgf::parse(text).is_err(), "{text:?} should not parse");
    }
}

// =============================================================================
// LRF
// =============================================================================

#[test]
fn test_lrf_round_trip_on_every_board_size() {
    for size in 4..=19 {
        let empty = GameTree::new(size, 6.5, 0, "Japanese");
        let decoded = lrf::decode(&lrf::encode(&empty).unwrap()).unwrap();
        assert_eq!(decoded.size(), size);
        assert_eq!(decoded.board().bounds(), None, "size {size} should stay empty");

        let mut game = GameTree::new(size, 6.5, 0, "Japanese");
        game.add_stone(0, 0, Some(Color::White));
        game.add_stone(size - 1, size - 1, Some(Color::Black));
        assert!(game.play(1, 1));
        assert!(game.play(size - 2, 1));
        game.undo(false);
        assert!(game.play(1, size - 2));

        let decoded = lrf::decode(&lrf::encode(&game).unwrap()).unwrap();
        assert_eq!(decoded.initial_board().cells(), game.initial_board().cells(), "size {size}");
        assert_eq!(moves(&decoded), moves(&game), "size {size}");
    }
}

#[test]
fn test_sgf_to_lrf_keeps_moves_and_root_marks() {
    let game = parse_one("(;SZ[9]AB[cc]TR[ee]LB[aa:X];B[ee](;W[ec];B[gc]C[lost])(;W[ce]))");
    let bytes = lrf::encode(&game).unwrap();
    let decoded = lrf::decode(&bytes).unwrap();

    assert_eq!(moves(&decoded), moves(&game));
    assert_eq!(decoded.board().get(2, 2), Intersection::Black);
    let root = decoded.tree().node(decoded.tree().root());
    assert_eq!(root.marks, vec![Mark::new(4, 4, MarkKind::Triangle)]);

    // Back to text: the comment and the label are gone, the rest survives
    let text = sgf::to_string(&decoded, WriteStyle::Compact);
    let again = parse_one(&text);
    assert_eq!(moves(&again), moves(&game));
    assert!(!text.contains("lost"));
}

#[test]
fn test_lrf_random_game() {
    let mut rng = fastrand::Rng::with_seed(7);
    let mut game = GameTree::new(19, 6.5, 0, "Japanese");
    let mut played = 0;
    while played < 150 {
        let (x, y) = (rng.usize(..19), rng.usize(..19));
        if game.play(x, y) {
            played += 1;
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("game.lrf");
    lrf::write(&game, File::create(&path).unwrap()).unwrap();
    let mut decoded = lrf::read(File::open(&path).unwrap()).unwrap();

    assert_eq!(moves(&decoded), moves(&game));
    decoded.goto_last_move();
    assert_eq!(decoded.board().cells(), game.board().cells());
    assert_eq!(decoded.black_prisoners(), game.black_prisoners());
    assert_eq!(decoded.white_prisoners(), game.white_prisoners());
}

#[test]
fn test_lrf_every_truncation_fails() {
    let game = parse_one("(;SZ[13]AB[cc][dd]AW[ee];B[ff](;W[gg];B[hh])(;W[ii]))");
    let bytes = lrf::encode(&game).unwrap();
    for len in 0..bytes.len() {
        assert!(lrf::decode(&bytes[..len]).is_err(), "prefix of {len} bytes decoded");
    }
}
