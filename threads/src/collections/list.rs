use core::{
    cell::Cell,
    fmt,
    iter::FusedIterator,
    marker::PhantomPinned,
    pin::Pin,
    ptr::{
        self,
        NonNull,
    },
};

// Used in `list_entry!`.
#[doc(hidden)]
pub use memoffset::offset_of;

/// Ссылка элемента списка на соседний элемент.
type Link = Cell<Option<NonNull<ListElem>>>;

/// Элемент интрузивного списка [`List`].
///
/// Встраивается полем в структуру, которую нужно хранить в списке.
/// Сам список ничего не выделяет и ничем не владеет ---
/// удаление элемента из списка не освобождает его владельца.
/// Перейти от элемента к владельцу позволяет макрос [`list_entry!`].
///
/// По состоянию ссылок элемент бывает:
///   - головой списка --- `prev` пуст, а `next` нет;
///   - внутренним элементом --- обе ссылки не пусты;
///   - хвостом списка --- `prev` не пуст, а `next` пуст;
///   - отсоединённым --- обе ссылки пусты, элемент не состоит ни в одном списке.
pub struct ListElem {
    /// Предыдущий элемент.
    prev: Link,

    /// Следующий элемент.
    next: Link,

    /// Соседи хранят адрес элемента, поэтому перемещать его нельзя.
    _pinned: PhantomPinned,
}

impl ListElem {
    /// Создаёт отсоединённый элемент.
    pub const fn new() -> Self {
        Self {
            prev: Cell::new(None),
            next: Cell::new(None),
            _pinned: PhantomPinned,
        }
    }

    /// Возвращает `true`, если элемент является головой списка.
    pub fn is_head(&self) -> bool {
        self.prev.get().is_none() && self.next.get().is_some()
    }

    /// Возвращает `true`, если элемент является внутренним элементом списка.
    pub fn is_interior(&self) -> bool {
        self.prev.get().is_some() && self.next.get().is_some()
    }

    /// Возвращает `true`, если элемент является хвостом списка.
    pub fn is_tail(&self) -> bool {
        self.prev.get().is_some() && self.next.get().is_none()
    }

    /// Возвращает `true`, если элемент не состоит ни в одном списке.
    pub fn is_detached(&self) -> bool {
        self.prev.get().is_none() && self.next.get().is_none()
    }

    /// Возвращает элемент, следующий за данным.
    /// Для последнего элемента списка это хвост [`List::end()`].
    ///
    /// # Panics
    ///
    /// Паникует, если элемент не является головой или внутренним элементом списка.
    pub fn next(&self) -> &ListElem {
        assert!(
            self.is_head() || self.is_interior(),
            "next() of a list element that is neither a head nor an interior element",
        );

        self.next_link()
    }

    /// Возвращает элемент, предшествующий данному.
    /// Для первого элемента списка это голова [`List::rend()`].
    ///
    /// # Panics
    ///
    /// Паникует, если элемент не является внутренним элементом или хвостом списка.
    pub fn prev(&self) -> &ListElem {
        assert!(
            self.is_interior() || self.is_tail(),
            "prev() of a list element that is neither an interior element nor a tail",
        );

        self.prev_link()
    }

    /// Следующий элемент без проверки вида данного элемента.
    fn next_link(&self) -> &ListElem {
        let next = self.next.get().expect("a list element has no successor");
        // SAFETY: ссылки указывают только на элементы, которые
        // по контракту вставки живы и не перемещаются, пока состоят в списке.
        unsafe { next.as_ref() }
    }

    /// Предыдущий элемент без проверки вида данного элемента.
    fn prev_link(&self) -> &ListElem {
        let prev = self.prev.get().expect("a list element has no predecessor");
        // SAFETY: см. `ListElem::next_link()`.
        unsafe { prev.as_ref() }
    }

    /// Делает `next` следующим элементом.
    fn set_next(
        &self,
        next: &ListElem,
    ) {
        self.next.set(Some(NonNull::from(next)));
    }

    /// Делает `prev` предыдущим элементом.
    fn set_prev(
        &self,
        prev: &ListElem,
    ) {
        self.prev.set(Some(NonNull::from(prev)));
    }

    /// Меняет местами ссылки на соседей.
    fn swap_links(&self) {
        self.prev.swap(&self.next);
    }

    /// Забывает соседей.
    fn detach(&self) {
        self.prev.set(None);
        self.next.set(None);
    }
}

impl Default for ListElem {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ListElem {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        let kind = if self.is_head() {
            "head"
        } else if self.is_interior() {
            "interior"
        } else if self.is_tail() {
            "tail"
        } else {
            "detached"
        };

        write!(formatter, "ListElem({:p}, {})", self, kind)
    }
}

/// См. [The Rustonomicon, "Send and Sync"](https://doc.rust-lang.org/nomicon/send-and-sync.html).
///
/// Со списками работают только при запрещённых прерываниях на единственном процессоре
/// либо под защитой внешней блокировки.
unsafe impl Send for ListElem {
}

/// См. [The Rustonomicon, "Send and Sync"](https://doc.rust-lang.org/nomicon/send-and-sync.html).
unsafe impl Sync for ListElem {
}

/// Интрузивный двусвязный список с фиктивными головой и хвостом.
///
/// Пустой список выглядит так:
///
/// ```text
///    +------+     +------+
///  <-| head |<--->| tail |->
///    +------+     +------+
/// ```
///
/// А список из двух элементов --- так:
///
/// ```text
///    +------+     +-------+     +-------+     +------+
///  <-| head |<--->|   1   |<--->|   2   |<--->| tail |->
///    +------+     +-------+     +-------+     +------+
/// ```
///
/// Симметрия убирает частные случаи: например, [`List::remove()`]
/// обходится двумя присваиваниями без единого условия.
///
/// Голова и хвост ссылаются друг на друга, поэтому список создаётся в два шага:
/// [`List::new()`] возвращает ещё не связанный заголовок,
/// а [`List::init()`] связывает его на месте, когда он уже закреплён.
/// Любая операция над несвязанным списком паникует.
///
/// Сам список не синхронизирует доступ --- это забота вызывающего кода.
///
/// # Examples
///
/// ```rust
/// # use core::pin::pin;
/// # use threads::{List, ListElem, list_entry};
/// #
/// struct Item {
///     value: i32,
///     elem: ListElem,
/// }
///
/// let items = [3, 1, 2].map(|value| Item { value, elem: ListElem::new() });
///
/// let list = pin!(List::new());
/// let list = list.into_ref();
/// list.init();
///
/// for item in &items {
///     // SAFETY: `items` переживает список и не перемещается.
///     unsafe { list.push_back(&item.elem) };
/// }
///
/// list.sort(|a, b| unsafe { list_entry!(a, Item, elem).value < list_entry!(b, Item, elem).value });
///
/// let values: Vec<_> = list.iter().map(|elem| unsafe { list_entry!(elem, Item, elem).value }).collect();
/// assert_eq!(values, [1, 2, 3]);
/// ```
pub struct List {
    /// Фиктивный элемент перед первым.
    head: ListElem,

    /// Фиктивный элемент после последнего.
    tail: ListElem,
}

impl List {
    /// Создаёт заголовок списка.
    /// Перед использованием список нужно закрепить и вызвать [`List::init()`].
    pub const fn new() -> Self {
        Self {
            head: ListElem::new(),
            tail: ListElem::new(),
        }
    }

    /// Делает список пустым, связывая голову с хвостом.
    pub fn init(self: Pin<&Self>) {
        let list = self.get_ref();

        list.head.prev.set(None);
        list.head.set_next(&list.tail);
        list.tail.set_prev(&list.head);
        list.tail.next.set(None);
    }

    /// Возвращает первый элемент списка, либо [`List::end()`] для пустого списка.
    pub fn begin(&self) -> &ListElem {
        assert!(self.head.is_head(), "the list is not initialized");
        self.head.next_link()
    }

    /// Возвращает хвост списка.
    /// С ним сравнивают при обходе от начала к концу, но не разыменовывают как данные.
    pub fn end(&self) -> &ListElem {
        &self.tail
    }

    /// Возвращает последний элемент списка, либо [`List::rend()`] для пустого списка.
    pub fn rbegin(&self) -> &ListElem {
        assert!(self.tail.is_tail(), "the list is not initialized");
        self.tail.prev_link()
    }

    /// Возвращает голову списка.
    /// С ней сравнивают при обходе от конца к началу.
    pub fn rend(&self) -> &ListElem {
        &self.head
    }

    /// Возвращает голову списка для обхода в стиле `while e.next() != list.end()`.
    pub fn head(&self) -> &ListElem {
        &self.head
    }

    /// Возвращает хвост списка.
    pub fn tail(&self) -> &ListElem {
        &self.tail
    }

    /// Возвращает первый элемент списка.
    ///
    /// # Panics
    ///
    /// Паникует, если список пуст.
    pub fn front(&self) -> &ListElem {
        assert!(!self.is_empty(), "front() of an empty list");
        self.begin()
    }

    /// Возвращает последний элемент списка.
    ///
    /// # Panics
    ///
    /// Паникует, если список пуст.
    pub fn back(&self) -> &ListElem {
        assert!(!self.is_empty(), "back() of an empty list");
        self.rbegin()
    }

    /// Вставляет отсоединённый элемент `elem` непосредственно перед `before`,
    /// который должен быть внутренним элементом или хвостом списка.
    /// Вставка перед хвостом равносильна [`List::push_back()`].
    ///
    /// # Safety
    ///
    /// `elem` должен оставаться живым и не перемещаться, пока состоит в списке.
    /// Список, в который он вставлен, должен пережить его членство в нём.
    pub unsafe fn insert(
        before: &ListElem,
        elem: &ListElem,
    ) {
        assert!(
            before.is_interior() || before.is_tail(),
            "insert() before a list element that is neither an interior element nor a tail",
        );
        assert!(elem.is_detached(), "insert() of an element that is already in a list");

        let prev = before.prev_link();

        elem.set_prev(prev);
        elem.set_next(before);
        prev.set_next(elem);
        before.set_prev(elem);
    }

    /// Вырезает элементы полуинтервала `[first, last)` из их текущего списка
    /// и вставляет их непосредственно перед `before`,
    /// который должен быть внутренним элементом или хвостом списка.
    /// Работает за `O(1)` независимо от длины полуинтервала.
    ///
    /// # Safety
    ///
    /// Перемещаемые элементы должны оставаться живыми и на месте,
    /// пока состоят в списке, которому принадлежит `before`.
    pub unsafe fn splice(
        before: &ListElem,
        first: &ListElem,
        last: &ListElem,
    ) {
        assert!(
            before.is_interior() || before.is_tail(),
            "splice() before a list element that is neither an interior element nor a tail",
        );

        if ptr::eq(first, last) {
            return;
        }

        let last = last.prev();

        assert!(first.is_interior(), "splice() of a range that starts outside a list");
        assert!(last.is_interior(), "splice() of a range that ends outside a list");

        let first_prev = first.prev_link();
        let last_next = last.next_link();
        first_prev.set_next(last_next);
        last_next.set_prev(first_prev);

        let before_prev = before.prev_link();
        first.set_prev(before_prev);
        last.set_next(before);
        before_prev.set_next(first);
        before.set_prev(last);
    }

    /// Вставляет `elem` в начало списка.
    ///
    /// # Safety
    ///
    /// См. [`List::insert()`].
    pub unsafe fn push_front(
        &self,
        elem: &ListElem,
    ) {
        // SAFETY: контракт переходит к вызывающему коду.
        unsafe { Self::insert(self.begin(), elem) }
    }

    /// Вставляет `elem` в конец списка.
    ///
    /// # Safety
    ///
    /// См. [`List::insert()`].
    pub unsafe fn push_back(
        &self,
        elem: &ListElem,
    ) {
        assert!(self.tail.is_tail(), "the list is not initialized");
        // SAFETY: контракт переходит к вызывающему коду.
        unsafe { Self::insert(self.end(), elem) }
    }

    /// Удаляет внутренний элемент `elem` из его списка и возвращает элемент,
    /// который за ним следовал.
    ///
    /// После удаления `elem` становится отсоединённым,
    /// поэтому обходить список через него нельзя.
    /// Правильный обход с удалением продвигается на возвращённый элемент:
    ///
    /// ```rust,ignore
    /// let mut e = list.begin();
    /// while !ptr::eq(e, list.end()) {
    ///     e = if should_remove(e) { List::remove(e) } else { e.next() };
    /// }
    /// ```
    ///
    /// # Panics
    ///
    /// Паникует, если `elem` не является внутренним элементом списка.
    pub fn remove(elem: &ListElem) -> &ListElem {
        assert!(elem.is_interior(), "remove() of an element that is not in a list");

        let prev = elem.prev_link();
        let next = elem.next_link();

        prev.set_next(next);
        next.set_prev(prev);
        elem.detach();

        next
    }

    /// Удаляет первый элемент из списка и возвращает его.
    ///
    /// # Panics
    ///
    /// Паникует, если список пуст.
    pub fn pop_front(&self) -> &ListElem {
        let front = self.front();
        Self::remove(front);
        front
    }

    /// Удаляет последний элемент из списка и возвращает его.
    ///
    /// # Panics
    ///
    /// Паникует, если список пуст.
    pub fn pop_back(&self) -> &ListElem {
        let back = self.back();
        Self::remove(back);
        back
    }

    /// Возвращает количество элементов в списке.
    /// Работает за `O(n)`, длина списка нигде не хранится.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Возвращает `true`, если список пуст.
    pub fn is_empty(&self) -> bool {
        ptr::eq(self.begin(), self.end())
    }

    /// Итератор по элементам списка от начала к концу.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            front: self.begin(),
            back: self.end(),
        }
    }

    /// Разворачивает список на месте за `O(n)` без дополнительной памяти.
    pub fn reverse(&self) {
        if self.is_empty() {
            return;
        }

        let first = self.begin();
        let last = self.rbegin();

        let mut elem = first;
        while !ptr::eq(elem, self.end()) {
            elem.swap_links();
            // После обмена бывший следующий элемент стал предыдущим.
            elem = elem.prev_link();
        }

        self.head.set_next(last);
        self.tail.set_prev(first);
        last.set_prev(&self.head);
        first.set_next(&self.tail);
    }

    /// Сортирует список по неубыванию относительно `less`.
    ///
    /// Реализует
    /// [естественную сортировку слиянием](https://en.wikipedia.org/wiki/Merge_sort#Natural_merge_sort):
    /// за каждый проход находит соседние максимальные неубывающие серии
    /// и попарно сливает их на месте с помощью [`List::splice()`],
    /// пока не останется одна серия.
    /// Работает за `O(n log n)` без дополнительной памяти и сохраняет
    /// относительный порядок равных элементов.
    ///
    /// Контекст сравнения, если он нужен, захватывается замыканием `less`.
    pub fn sort<F>(
        &self,
        mut less: F,
    ) where
        F: FnMut(&ListElem, &ListElem) -> bool,
    {
        loop {
            let mut output_run_count = 0;
            let mut a0 = self.begin();

            while !ptr::eq(a0, self.end()) {
                output_run_count += 1;

                let a1b0 = find_end_of_run(a0, self.end(), &mut less);
                if ptr::eq(a1b0, self.end()) {
                    break;
                }

                let b1 = find_end_of_run(a1b0, self.end(), &mut less);
                inplace_merge(a0, a1b0, b1, &mut less);
                a0 = b1;
            }

            if output_run_count <= 1 {
                break;
            }
        }

        debug_assert!(is_sorted(self.begin(), self.end(), &mut less));
    }

    /// Вставляет `elem` в отсортированный относительно `less` список
    /// перед первым элементом `e`, для которого `less(elem, e)`.
    /// Равные элементы остаются впереди `elem`.
    /// Работает за `O(n)`.
    ///
    /// # Safety
    ///
    /// См. [`List::insert()`].
    pub unsafe fn insert_ordered<F>(
        &self,
        elem: &ListElem,
        mut less: F,
    ) where
        F: FnMut(&ListElem, &ListElem) -> bool,
    {
        let position = self.iter().find(|&e| less(elem, e)).unwrap_or(self.end());

        // SAFETY: контракт переходит к вызывающему коду.
        unsafe { Self::insert(position, elem) }
    }

    /// Оставляет только первый элемент в каждой группе соседних равных
    /// относительно `less` элементов.
    /// Удалённые элементы дописываются в конец `duplicates`, если он задан.
    ///
    /// Чтобы удалить все повторы, список должен быть отсортирован тем же `less`.
    ///
    /// # Safety
    ///
    /// Если `duplicates` задан, он должен пережить членство
    /// перенесённых в него элементов, см. [`List::insert()`].
    pub unsafe fn unique<F>(
        &self,
        duplicates: Option<&List>,
        mut less: F,
    ) where
        F: FnMut(&ListElem, &ListElem) -> bool,
    {
        if self.is_empty() {
            return;
        }

        let mut elem = self.begin();
        loop {
            let next = elem.next();
            if ptr::eq(next, self.end()) {
                break;
            }

            if !less(elem, next) && !less(next, elem) {
                Self::remove(next);
                if let Some(duplicates) = duplicates {
                    // SAFETY: контракт переходит к вызывающему коду.
                    unsafe { duplicates.push_back(next) };
                }
            } else {
                elem = next;
            }
        }
    }

    /// Возвращает наибольший относительно `less` элемент.
    /// Из нескольких наибольших возвращает самый первый.
    /// Для пустого списка возвращает [`List::end()`].
    pub fn max<F>(
        &self,
        mut less: F,
    ) -> &ListElem
    where
        F: FnMut(&ListElem, &ListElem) -> bool,
    {
        self.iter().reduce(|max, e| if less(max, e) { e } else { max }).unwrap_or(self.end())
    }

    /// Возвращает наименьший относительно `less` элемент.
    /// Из нескольких наименьших возвращает самый первый.
    /// Для пустого списка возвращает [`List::end()`].
    pub fn min<F>(
        &self,
        mut less: F,
    ) -> &ListElem
    where
        F: FnMut(&ListElem, &ListElem) -> bool,
    {
        self.iter().reduce(|min, e| if less(e, min) { e } else { min }).unwrap_or(self.end())
    }

    /// Проверяет внутренние инварианты списка.
    ///
    /// # Panics
    ///
    /// Паникует, если инварианты нарушены.
    pub fn validate(&self) {
        assert!(self.head.is_head(), "the list head is broken");
        assert!(self.tail.is_tail(), "the list tail is broken");

        let mut prev = &self.head;
        let mut elem = self.head.next_link();

        while !ptr::eq(elem, &self.tail) {
            assert!(elem.is_interior());
            assert!(ptr::eq(elem.prev_link(), prev));

            prev = elem;
            elem = elem.next_link();
        }

        assert!(ptr::eq(self.tail.prev_link(), prev));
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for List {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        if self.head.is_head() {
            formatter.debug_list().entries(self.iter()).finish()
        } else {
            write!(formatter, "List(uninitialized)")
        }
    }
}

impl<'a> IntoIterator for &'a List {
    type Item = &'a ListElem;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Итератор по элементам [`List`].
/// Перебирает полуинтервал `[front, back)`.
#[derive(Clone)]
pub struct Iter<'a> {
    /// Очередной элемент с начала.
    front: &'a ListElem,

    /// Элемент, следующий за очередным элементом с конца.
    back: &'a ListElem,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a ListElem;

    fn next(&mut self) -> Option<Self::Item> {
        if ptr::eq(self.front, self.back) {
            None
        } else {
            let elem = self.front;
            self.front = elem.next();
            Some(elem)
        }
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if ptr::eq(self.front, self.back) {
            None
        } else {
            self.back = self.back.prev();
            Some(self.back)
        }
    }
}

impl FusedIterator for Iter<'_> {
}

/// По элементу `$elem` списка, встроенному в поле `$field` структуры `$type`,
/// возвращает ссылку на эту структуру.
///
/// Раскрывается в небезопасный код, поэтому используется внутри `unsafe`-блока.
/// Вызывающий код гарантирует, что `$elem` действительно является полем `$field`
/// живого значения типа `$type`.
#[macro_export]
macro_rules! list_entry {
    ($elem:expr, $type:path, $field:ident) => {{
        let elem: &$crate::collections::ListElem = $elem;
        let offset = $crate::collections::list::offset_of!($type, $field);
        &*(::core::ptr::from_ref(elem).byte_sub(offset).cast::<$type>())
    }};
}

/// Возвращает `true`, если элементы полуинтервала `[a, b)`
/// упорядочены по неубыванию относительно `less`.
fn is_sorted<F>(
    mut a: &ListElem,
    b: &ListElem,
    less: &mut F,
) -> bool
where
    F: FnMut(&ListElem, &ListElem) -> bool,
{
    if !ptr::eq(a, b) {
        loop {
            a = a.next();
            if ptr::eq(a, b) {
                break;
            }
            if less(a, a.prev()) {
                return false;
            }
        }
    }

    true
}

/// Находит неубывающую относительно `less` серию,
/// которая начинается в `a` и заканчивается не позже `b`.
/// Возвращает элемент сразу за концом серии.
///
/// Полуинтервал `[a, b)` должен быть непустым.
fn find_end_of_run<'a, F>(
    mut a: &'a ListElem,
    b: &ListElem,
    less: &mut F,
) -> &'a ListElem
where
    F: FnMut(&ListElem, &ListElem) -> bool,
{
    assert!(!ptr::eq(a, b));

    loop {
        a = a.next();
        if ptr::eq(a, b) || less(a, a.prev()) {
            return a;
        }
    }
}

/// Сливает на месте отсортированные серии `[a0, a1b0)` и `[a1b0, b1)`
/// в одну отсортированную серию, которая тоже заканчивается перед `b1`.
fn inplace_merge<F>(
    mut a0: &ListElem,
    mut a1b0: &ListElem,
    b1: &ListElem,
    less: &mut F,
) where
    F: FnMut(&ListElem, &ListElem) -> bool,
{
    debug_assert!(is_sorted(a0, a1b0, less));
    debug_assert!(is_sorted(a1b0, b1, less));

    while !ptr::eq(a0, a1b0) && !ptr::eq(a1b0, b1) {
        if !less(a1b0, a0) {
            a0 = a0.next();
        } else {
            a1b0 = a1b0.next();
            // SAFETY: элемент остаётся в том же списке.
            unsafe { List::splice(a0, a1b0.prev(), a1b0) };
        }
    }
}
