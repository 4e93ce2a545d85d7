/// Интрузивный
/// [двусвязный список](https://en.wikipedia.org/wiki/Doubly_linked_list)
/// с фиктивными головой и хвостом.
pub mod list;

pub use list::{
    Iter,
    List,
    ListElem,
};
