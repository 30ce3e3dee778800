//! Chess rules used to adjudicate engine games.
//!
//! The match never generates moves itself; it only needs to know whose turn
//! it is, whether an engine's move is legal, and whether the game is over.
//! [`Referee`] is that seam. [`StandardReferee`] answers it with `cozy-chess`.

use cozy_chess::{BitBoard, Board, Color, File, Move, Piece, Square};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uci::UciMove;

/// Errors raised while adjudicating a game.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefereeError {
    /// The starting position could not be set up.
    #[error("Invalid FEN '{0}'")]
    InvalidFen(String),
    /// The move is not legal in the current position.
    #[error("Illegal move: {0}")]
    IllegalMove(String),
}

/// A side of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

/// Why a game ended in a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawReason {
    Stalemate,
    InsufficientMaterial,
    FiftyMoveRule,
    ThreefoldRepetition,
}

impl fmt::Display for DrawReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DrawReason::Stalemate => "stalemate",
            DrawReason::InsufficientMaterial => "insufficient material",
            DrawReason::FiftyMoveRule => "fifty-move rule",
            DrawReason::ThreefoldRepetition => "threefold repetition",
        };
        f.write_str(text)
    }
}

/// Terminal state of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Checkmate.
    Winner(Side),
    Draw(DrawReason),
}

/// Rules collaborator for the game loop.
pub trait Referee {
    /// Sets up a fresh game from `fen`, forgetting all history.
    fn reset(&mut self, fen: &str) -> Result<(), RefereeError>;

    /// Whose turn it is.
    fn side_to_move(&self) -> Side;

    /// Plays `mv` if it is legal; the position is unchanged on error.
    fn play(&mut self, mv: &UciMove) -> Result<(), RefereeError>;

    /// `Some` once the game is over, draws that can be claimed included.
    fn outcome(&self) -> Option<Outcome>;
}

/// Standard chess rules backed by `cozy-chess`.
#[derive(Debug, Clone)]
pub struct StandardReferee {
    board: Board,
    /// Hashes of every position since the last reset, current one included.
    history: Vec<u64>,
}

impl Default for StandardReferee {
    fn default() -> Self {
        let board = Board::default();
        let history = vec![board.hash()];
        Self { board, history }
    }
}

impl StandardReferee {
    pub fn new() -> Self {
        Self::default()
    }

    fn legal_moves(&self) -> Vec<Move> {
        let mut moves = Vec::new();
        self.board.generate_moves(|list| {
            moves.extend(list);
            false
        });
        moves
    }

    /// `cozy-chess` writes castling as king-takes-rook; engines send `e1g1`.
    fn standard_uci(&self, mv: Move) -> String {
        let mut to = mv.to;
        let castles = self.board.piece_on(mv.from) == Some(Piece::King)
            && self.board.colors(self.board.side_to_move()).has(mv.to);
        if castles {
            let file = if mv.to.file() as usize > mv.from.file() as usize {
                File::G
            } else {
                File::C
            };
            to = Square::new(file, mv.from.rank());
        }
        let promotion = match mv.promotion {
            Some(Piece::Queen) => "q",
            Some(Piece::Rook) => "r",
            Some(Piece::Bishop) => "b",
            Some(Piece::Knight) => "n",
            _ => "",
        };
        format!("{}{}{}", mv.from, to, promotion)
    }

    fn insufficient_material(&self) -> bool {
        let heavy = self.board.pieces(Piece::Pawn)
            | self.board.pieces(Piece::Rook)
            | self.board.pieces(Piece::Queen);
        if !heavy.is_empty() {
            return false;
        }
        let knights = self.board.pieces(Piece::Knight);
        let bishops = self.board.pieces(Piece::Bishop);
        if (knights | bishops).len() <= 1 {
            return true;
        }
        // Bishops that all share one square color can never give mate.
        knights.is_empty()
            && (bishops.is_subset(BitBoard::DARK_SQUARES) || bishops.is_subset(BitBoard::LIGHT_SQUARES))
    }

    fn repetitions(&self) -> usize {
        let current = self.board.hash();
        self.history.iter().filter(|&&h| h == current).count()
    }
}

impl Referee for StandardReferee {
    fn reset(&mut self, fen: &str) -> Result<(), RefereeError> {
        let board =
            Board::from_fen(fen.trim(), false).map_err(|_| RefereeError::InvalidFen(fen.to_string()))?;
        self.history = vec![board.hash()];
        self.board = board;
        Ok(())
    }

    fn side_to_move(&self) -> Side {
        match self.board.side_to_move() {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }

    fn play(&mut self, mv: &UciMove) -> Result<(), RefereeError> {
        let found = self
            .legal_moves()
            .into_iter()
            .find(|&m| self.standard_uci(m) == mv.as_str())
            .ok_or_else(|| RefereeError::IllegalMove(mv.to_string()))?;

        self.board.play_unchecked(found);
        self.history.push(self.board.hash());
        Ok(())
    }

    fn outcome(&self) -> Option<Outcome> {
        if self.legal_moves().is_empty() {
            return Some(if self.board.checkers().is_empty() {
                Outcome::Draw(DrawReason::Stalemate)
            } else {
                Outcome::Winner(self.side_to_move().opposite())
            });
        }
        if self.insufficient_material() {
            Some(Outcome::Draw(DrawReason::InsufficientMaterial))
        } else if self.board.halfmove_clock() >= 100 {
            Some(Outcome::Draw(DrawReason::FiftyMoveRule))
        } else if self.repetitions() >= 3 {
            Some(Outcome::Draw(DrawReason::ThreefoldRepetition))
        } else {
            None
        }
    }
}
