//! Card ordering for the deals board, kept free of storage so it can be
//! checked exhaustively.

use std::collections::HashSet;
use uuid::Uuid;

/// One list's cards in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub list_id: Uuid,
    pub cards: Vec<Uuid>,
}

impl Column {
    pub fn new(list_id: Uuid, cards: Vec<Uuid>) -> Self {
        Self { list_id, cards }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("card is not in the source list")]
    CardNotFound,
    #[error("list order must name every list exactly once")]
    NotAPermutation,
}

/// Moves `card` out of `source` and into `target` at `position`, clamped to
/// the end of the target. With no `target` the card is reordered within
/// `source`. Returns every column whose positions changed, with the new order.
pub fn move_card(
    mut source: Column,
    target: Option<Column>,
    card: Uuid,
    position: usize,
) -> Result<Vec<Column>, BoardError> {
    let index = source
        .cards
        .iter()
        .position(|c| *c == card)
        .ok_or(BoardError::CardNotFound)?;
    source.cards.remove(index);

    match target {
        Some(mut target) if target.list_id != source.list_id => {
            target.cards.retain(|c| *c != card);
            let at = position.min(target.cards.len());
            target.cards.insert(at, card);
            Ok(vec![source, target])
        }
        _ => {
            let at = position.min(source.cards.len());
            source.cards.insert(at, card);
            Ok(vec![source])
        }
    }
}

/// Validates a requested list order against the lists that exist.
pub fn reorder(existing: &[Uuid], requested: &[Uuid]) -> Result<Vec<Uuid>, BoardError> {
    let existing_set: HashSet<&Uuid> = existing.iter().collect();
    let requested_set: HashSet<&Uuid> = requested.iter().collect();
    if requested.len() != existing.len()
        || requested_set.len() != requested.len()
        || requested_set != existing_set
    {
        return Err(BoardError::NotAPermutation);
    }
    Ok(requested.to_vec())
}
