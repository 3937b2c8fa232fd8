//! Plain-text board rendering for the terminal client.

use gambit_core::{BoardView, Orientation, ViewStatus};

/// Draw the placement field of a FEN string, seen from `orientation`.
pub fn render_board(fen: &str, orientation: Orientation) -> String {
    let placement = fen.split_whitespace().next().unwrap_or_default();
    let mut rows: Vec<Vec<char>> = placement
        .split('/')
        .map(|rank| {
            rank.chars()
                .flat_map(|c| match c.to_digit(10) {
                    Some(n) => vec!['.'; n as usize],
                    None => vec![c],
                })
                .collect()
        })
        .collect();
    // FEN lists rank 8 first
    let mut labels: Vec<u8> = (1..=8).rev().collect();
    let mut files: Vec<char> = ('a'..='h').collect();

    if orientation == Orientation::Black {
        rows.reverse();
        rows.iter_mut().for_each(|row| row.reverse());
        labels.reverse();
        files.reverse();
    }

    let mut out = String::new();
    for (label, row) in labels.iter().zip(&rows) {
        let squares: Vec<String> = row.iter().map(|c| c.to_string()).collect();
        out.push_str(&format!("{} {}\n", label, squares.join(" ")));
    }
    let footer: Vec<String> = files.iter().map(|c| c.to_string()).collect();
    out.push_str(&format!("  {}\n", footer.join(" ")));
    out
}

/// One-line status for a view.
pub fn describe(view: &BoardView) -> String {
    let side = match view.orientation {
        Orientation::White => "White",
        Orientation::Black => "Black",
    };
    match view.status {
        ViewStatus::WaitingForOpponent => "Waiting for an opponent to join...".to_string(),
        ViewStatus::Playing if view.my_turn => format!("You play {}. Your move.", side),
        ViewStatus::Playing => format!("You play {}. Waiting for opponent.", side),
        ViewStatus::Finished(outcome) => format!("Game over: {}", outcome),
        ViewStatus::Broken => "Game state diverged from the opponent; session discarded.".to_string(),
        ViewStatus::Abandoned => "Game abandoned, no further moves can be played.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn test_render_white() {
        let board = render_board(START, Orientation::White);
        let lines: Vec<&str> = board.lines().collect();
        assert_eq!(lines[0], "8 r n b q k b n r");
        assert_eq!(lines[4], "4 . . . . . . . .");
        assert_eq!(lines[7], "1 R N B Q K B N R");
        assert_eq!(lines[8], "  a b c d e f g h");
    }

    #[test]
    fn test_render_black() {
        let board = render_board(START, Orientation::Black);
        let lines: Vec<&str> = board.lines().collect();
        assert_eq!(lines[0], "1 R N B K Q B N R");
        assert_eq!(lines[8], "  h g f e d c b a");
    }

    #[test]
    fn test_describe() {
        let view = BoardView {
            position: START.to_string(),
            orientation: Orientation::Black,
            my_turn: false,
            status: ViewStatus::Playing,
        };
        assert_eq!(describe(&view), "You play Black. Waiting for opponent.");

        let left = BoardView {
            status: ViewStatus::Abandoned,
            ..view
        };
        assert_eq!(describe(&left), "Game abandoned, no further moves can be played.");
    }
}
