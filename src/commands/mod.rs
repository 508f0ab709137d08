pub mod evaluate;
pub mod extract;
pub mod template;
