pub mod board_item;
pub mod item_draft;
pub mod source_item;
