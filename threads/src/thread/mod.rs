use core::{
    cell::Cell,
    fmt,
    pin::Pin,
    ptr::NonNull,
};

use derive_more::{
    Display,
    From,
    Into,
};
use pin_project::pin_project;

use crate::{
    collections::{
        List,
        ListElem,
    },
    list_entry,
    sync::{
        Lock,
        donation,
    },
};

/// Приоритет потока.
pub mod priority;

/// Контракт внешнего планировщика.
pub mod scheduler;

pub use priority::Priority;
pub use scheduler::{
    InterruptLevel,
    Scheduler,
};

/// Идентификатор потока.
#[derive(Clone, Copy, Debug, Display, Eq, From, Hash, Into, Ord, PartialEq, PartialOrd)]
#[display("{}", _0)]
pub struct Tid(usize);

impl Tid {
    /// Создаёт идентификатор потока из его номера.
    pub const fn new(tid: usize) -> Self {
        Self(tid)
    }
}

/// Часть описателя потока, которой пользуются примитивы синхронизации.
///
/// Остальное состояние потока --- стек, контекст, статус планирования ---
/// принадлежит планировщику.
/// Описатель встраивается в очереди ожидания через [`Thread::elem`],
/// а в список доноров владельца блокировки --- через [`Thread::donation_elem`].
#[pin_project]
pub struct Thread {
    /// Идентификатор потока.
    tid: Tid,

    /// Имя потока для отладки.
    name: &'static str,

    /// Эффективный приоритет с учётом пожертвованных.
    priority: Cell<Priority>,

    /// Собственный приоритет потока.
    base_priority: Cell<Priority>,

    /// Блокировка, освобождения которой ждёт поток.
    waiting_on: Cell<Option<NonNull<Lock>>>,

    /// Элемент очереди готовых потоков или очереди ожидания.
    /// В каждый момент поток состоит не более чем в одной такой очереди.
    elem: ListElem,

    /// Потоки, которые ждут блокировок, захваченных этим потоком.
    #[pin]
    donations: List,

    /// Элемент списка [`Thread::donations`] владельца блокировки, которую ждёт поток.
    donation_elem: ListElem,
}

impl Thread {
    /// Создаёт описатель потока `tid` с именем `name` и приоритетом `priority`.
    /// Перед использованием описатель нужно закрепить и вызвать [`Thread::init()`].
    pub const fn new(
        tid: Tid,
        name: &'static str,
        priority: Priority,
    ) -> Self {
        Self {
            tid,
            name,
            priority: Cell::new(priority),
            base_priority: Cell::new(priority),
            waiting_on: Cell::new(None),
            elem: ListElem::new(),
            donations: List::new(),
            donation_elem: ListElem::new(),
        }
    }

    /// Инициализирует закреплённый описатель.
    pub fn init(self: Pin<&Self>) {
        self.project_ref().donations.init();
    }

    /// Идентификатор потока.
    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// Имя потока.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Эффективный приоритет потока.
    /// Не меньше собственного приоритета и приоритетов всех доноров.
    pub fn priority(&self) -> Priority {
        self.priority.get()
    }

    /// Собственный приоритет потока.
    pub fn base_priority(&self) -> Priority {
        self.base_priority.get()
    }

    /// Меняет собственный приоритет потока и пересчитывает эффективный.
    ///
    /// Решение о вытеснении остаётся за планировщиком.
    pub fn set_base_priority(
        &self,
        priority: Priority,
    ) {
        self.base_priority.set(priority);
        donation::reset_priority(self);
    }

    /// Блокировка, освобождения которой ждёт поток.
    pub fn waiting_on(&self) -> Option<&Lock> {
        // SAFETY: поток ссылается на блокировку только пока ждёт её внутри
        // `Lock::acquire()`, а блокировка не может быть разрушена, пока её ждут.
        self.waiting_on.get().map(|lock| unsafe { lock.as_ref() })
    }

    /// Элемент очереди готовых потоков или очереди ожидания.
    pub fn elem(&self) -> &ListElem {
        &self.elem
    }

    /// Потоки, которые ждут блокировок, захваченных этим потоком.
    pub fn donors(&self) -> impl Iterator<Item = &Thread> {
        self.donations.iter().map(|elem| {
            // SAFETY: в `Thread::donations` состоят только `Thread::donation_elem`.
            unsafe { Thread::from_donation_elem(elem) }
        })
    }

    /// Возвращает поток, которому принадлежит элемент `elem`.
    ///
    /// # Safety
    ///
    /// `elem` должен быть полем [`Thread::elem`] живого описателя потока.
    pub unsafe fn from_elem(elem: &ListElem) -> &Thread {
        unsafe { list_entry!(elem, Thread, elem) }
    }

    /// Возвращает поток, которому принадлежит элемент `elem`.
    ///
    /// # Safety
    ///
    /// `elem` должен быть полем [`Thread::donation_elem`] живого описателя потока.
    pub(crate) unsafe fn from_donation_elem(elem: &ListElem) -> &Thread {
        unsafe { list_entry!(elem, Thread, donation_elem) }
    }

    /// Устанавливает эффективный приоритет.
    pub(crate) fn set_priority(
        &self,
        priority: Priority,
    ) {
        self.priority.set(priority);
    }

    /// Запоминает блокировку, которую ждёт поток.
    pub(crate) fn set_waiting_on(
        &self,
        lock: Option<&Lock>,
    ) {
        self.waiting_on.set(lock.map(NonNull::from));
    }

    /// Список доноров.
    pub(crate) fn donations(&self) -> &List {
        &self.donations
    }

    /// Элемент списка доноров владельца блокировки.
    pub(crate) fn donation_elem(&self) -> &ListElem {
        &self.donation_elem
    }
}

impl fmt::Debug for Thread {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        formatter
            .debug_struct("Thread")
            .field("tid", &self.tid)
            .field("name", &self.name)
            .field("priority", &self.priority())
            .field("base_priority", &self.base_priority())
            .finish()
    }
}

impl fmt::Display for Thread {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(formatter, "{}#{}", self.name, self.tid)
    }
}

/// См. [The Rustonomicon, "Send and Sync"](https://doc.rust-lang.org/nomicon/send-and-sync.html).
///
/// Поля описателя меняются только при запрещённых прерываниях.
unsafe impl Send for Thread {
}

/// См. [The Rustonomicon, "Send and Sync"](https://doc.rust-lang.org/nomicon/send-and-sync.html).
unsafe impl Sync for Thread {
}
