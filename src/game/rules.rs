//! Thin adapter over the `chess` crate: move parsing, legality and how a
//! position ends a game. Nothing here knows about clocks.

use chess::{Board, BoardStatus, ChessMove, Color, Game, Piece, Square};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{ChessError, Result};

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Checkmate,
    Resignation,
    Timeout,
    Stalemate,
    DrawByRule,
    DrawAgreement,
    InsufficientMaterial,
}

/// Terminal result of a session. `winner` is `None` for draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameOutcome {
    pub winner: Option<Color>,
    pub reason: Termination,
}

impl GameOutcome {
    pub fn win(winner: Color, reason: Termination) -> Self {
        GameOutcome { winner: Some(winner), reason }
    }

    pub fn draw(reason: Termination) -> Self {
        GameOutcome { winner: None, reason }
    }

    /// `"1-0"`, `"0-1"` or `"1/2-1/2"`.
    pub fn score(&self) -> &'static str {
        match self.winner {
            Some(Color::White) => "1-0",
            Some(Color::Black) => "0-1",
            None => "1/2-1/2",
        }
    }
}

pub fn color_to_string(color: Color) -> String {
    match color {
        Color::White => "white".to_string(),
        Color::Black => "black".to_string(),
    }
}

/// Parse a UCI move such as `e2e4` or `e7e8q` and check it is legal on `board`.
pub fn parse_move(board: &Board, uci: &str) -> Result<ChessMove> {
    let uci = uci.trim().to_lowercase();
    if !(4..=5).contains(&uci.len()) || !uci.is_ascii() {
        return Err(ChessError::IllegalMove(format!("malformed move {uci:?}")));
    }

    let from = Square::from_str(&uci[0..2]).map_err(|_| ChessError::IllegalMove(format!("bad square in {uci:?}")))?;
    let to = Square::from_str(&uci[2..4]).map_err(|_| ChessError::IllegalMove(format!("bad square in {uci:?}")))?;
    let promotion = match uci.as_bytes().get(4) {
        None => None,
        Some(b'q') => Some(Piece::Queen),
        Some(b'r') => Some(Piece::Rook),
        Some(b'b') => Some(Piece::Bishop),
        Some(b'n') => Some(Piece::Knight),
        Some(_) => return Err(ChessError::IllegalMove(format!("bad promotion piece in {uci:?}"))),
    };

    let chess_move = ChessMove::new(from, to, promotion);
    if !board.legal(chess_move) {
        return Err(ChessError::IllegalMove(uci));
    }
    Ok(chess_move)
}

/// How the current position ends the game, if it does.
pub fn termination(game: &Game) -> Option<GameOutcome> {
    let board = game.current_position();
    match board.status() {
        BoardStatus::Checkmate => return Some(GameOutcome::win(!board.side_to_move(), Termination::Checkmate)),
        BoardStatus::Stalemate => return Some(GameOutcome::draw(Termination::Stalemate)),
        BoardStatus::Ongoing => {}
    }
    if has_insufficient_material(&board) {
        return Some(GameOutcome::draw(Termination::InsufficientMaterial));
    }
    // Threefold repetition and the fifty-move rule are applied automatically.
    if game.can_declare_draw() {
        return Some(GameOutcome::draw(Termination::DrawByRule));
    }
    None
}

#[derive(Default)]
struct Material {
    heavy_or_pawns: u32,
    knights: u32,
    bishops_light: u32,
    bishops_dark: u32,
}

impl Material {
    fn minors(&self) -> u32 {
        self.knights + self.bishops_light + self.bishops_dark
    }
}

/// Neither side can possibly deliver mate: K v K, K+minor v K, or
/// K+B v K+B with both bishops on the same square colour.
pub fn has_insufficient_material(board: &Board) -> bool {
    let mut sides = [Material::default(), Material::default()];

    for square in *board.combined() {
        let (Some(piece), Some(color)) = (board.piece_on(square), board.color_on(square)) else {
            continue;
        };
        let side = &mut sides[color.to_index()];
        match piece {
            Piece::King => {}
            Piece::Knight => side.knights += 1,
            Piece::Bishop => {
                if (square.get_rank().to_index() + square.get_file().to_index()) % 2 == 0 {
                    side.bishops_dark += 1;
                } else {
                    side.bishops_light += 1;
                }
            }
            Piece::Pawn | Piece::Rook | Piece::Queen => side.heavy_or_pawns += 1,
        }
    }

    let [white, black] = &sides;
    if white.heavy_or_pawns > 0 || black.heavy_or_pawns > 0 {
        return false;
    }
    match (white.minors(), black.minors()) {
        (0, 0) | (1, 0) | (0, 1) => true,
        (1, 1) => {
            (white.bishops_light == 1 && black.bishops_light == 1)
                || (white.bishops_dark == 1 && black.bishops_dark == 1)
        }
        _ => false,
    }
}
