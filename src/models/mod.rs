pub mod board;
pub mod card;
pub mod timestamp;

pub use board::{Board, Column, ColumnPatch, ColumnStatus, NewColumn, Project};
pub use card::{
    Attachment, Card, CardChanges, CardDraft, CardPatch, ChecklistItem, Comment, Label, NewCard,
    Priority,
};
