use core::{
    fmt,
    pin::{
        Pin,
        pin,
    },
    ptr::NonNull,
};

use pin_project::{
    pin_project,
    pinned_drop,
};
use static_assertions::assert_impl_all;

use super::{
    InterruptGuard,
    Lock,
    Semaphore,
};
use crate::{
    collections::{
        List,
        ListElem,
    },
    list_entry,
    log::trace,
    thread::{
        Scheduler,
        Thread,
    },
};

/// [Условная переменная](https://en.wikipedia.org/wiki/Monitor_(synchronization)#Condition_variables)
/// с семантикой Mesa: разбуженный поток заново захватывает блокировку
/// и должен сам перепроверить условие.
///
/// Каждая условная переменная используется с одной блокировкой,
/// но одна блокировка может обслуживать несколько условных переменных.
#[pin_project]
pub struct Condition {
    /// Записи потоков, ждущих в [`Condition::wait()`].
    #[pin]
    waiters: List,
}

impl Condition {
    /// Создаёт условную переменную.
    /// Перед использованием её нужно закрепить и вызвать [`Condition::init()`].
    pub const fn new() -> Self {
        Self {
            waiters: List::new(),
        }
    }

    /// Инициализирует закреплённую условную переменную.
    pub fn init(self: Pin<&Self>) {
        self.project_ref().waiters.init();
    }

    /// Атомарно освобождает `lock` и ждёт сигнала, после чего снова захватывает `lock`.
    ///
    /// # Panics
    ///
    /// Паникует, если вызван из обработчика прерывания
    /// или если текущий поток не владеет `lock`.
    pub fn wait<S: Scheduler + ?Sized>(
        &self,
        lock: &Lock,
        scheduler: &S,
    ) {
        assert!(!scheduler.in_interrupt(), "Condition::wait() in an interrupt handler");
        assert!(
            lock.held_by_current(scheduler),
            "Condition::wait() without holding the lock",
        );

        let waiter = pin!(Waiter::new(scheduler.current()));
        let waiter = waiter.into_ref();
        waiter.project_ref().semaphore.init();

        {
            let _guard = InterruptGuard::new(scheduler);
            trace!(thread = %scheduler.current(), "waits for a condition");

            // SAFETY: запись живёт на стеке ждущего потока, а он не вернётся из
            // `Condition::wait()`, пока запись не удалят из списка в `Condition::signal()`.
            unsafe {
                self.waiters.insert_ordered(&waiter.elem, by_priority);
            }
        }

        lock.release(scheduler);
        waiter.semaphore.down(scheduler);
        lock.acquire(scheduler);
    }

    /// Будит самый приоритетный из потоков, ждущих сигнала, если такие есть.
    ///
    /// # Panics
    ///
    /// Паникует, если вызван из обработчика прерывания
    /// или если текущий поток не владеет `lock`.
    pub fn signal<S: Scheduler + ?Sized>(
        &self,
        lock: &Lock,
        scheduler: &S,
    ) {
        assert!(!scheduler.in_interrupt(), "Condition::signal() in an interrupt handler");
        assert!(
            lock.held_by_current(scheduler),
            "Condition::signal() without holding the lock",
        );

        let waiter = {
            let _guard = InterruptGuard::new(scheduler);

            if self.waiters.is_empty() {
                return;
            }

            self.waiters.sort(by_priority);
            // SAFETY: в списке состоят только `Waiter::elem`.
            unsafe { Waiter::from_elem(self.waiters.pop_front()) }
        };

        trace!(thread = %waiter.thread(), "signalled");
        waiter.semaphore.up(scheduler);
    }

    /// Будит все потоки, ждущие сигнала.
    ///
    /// # Panics
    ///
    /// Паникует, если вызван из обработчика прерывания
    /// или если текущий поток не владеет `lock`.
    pub fn broadcast<S: Scheduler + ?Sized>(
        &self,
        lock: &Lock,
        scheduler: &S,
    ) {
        while self.has_waiters() {
            self.signal(lock, scheduler);
        }
    }

    /// Возвращает `true`, если есть потоки, ждущие сигнала.
    pub fn has_waiters(&self) -> bool {
        !self.waiters.is_empty()
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Condition {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        formatter.debug_struct("Condition").field("waiters", &self.waiters.len()).finish()
    }
}

/// См. [The Rustonomicon, "Send and Sync"](https://doc.rust-lang.org/nomicon/send-and-sync.html).
///
/// Список ждущих меняется только при запрещённых прерываниях.
unsafe impl Send for Condition {
}

/// См. [The Rustonomicon, "Send and Sync"](https://doc.rust-lang.org/nomicon/send-and-sync.html).
unsafe impl Sync for Condition {
}

assert_impl_all!(Condition: Send, Sync);

/// Запись потока, ждущего в [`Condition::wait()`].
/// Живёт на его стеке.
#[pin_project(PinnedDrop)]
struct Waiter {
    /// Элемент списка [`Condition::waiters`].
    elem: ListElem,

    /// Ждущий поток.
    thread: NonNull<Thread>,

    /// Личный семафор ждущего потока с начальным значением 0.
    #[pin]
    semaphore: Semaphore,
}

impl Waiter {
    /// Создаёт запись для потока `thread`.
    fn new(thread: &Thread) -> Self {
        Self {
            elem: ListElem::new(),
            thread: NonNull::from(thread),
            semaphore: Semaphore::new(0),
        }
    }

    /// Ждущий поток.
    fn thread(&self) -> &Thread {
        // SAFETY: поток заблокирован в `Condition::wait()` и не может завершиться.
        unsafe { self.thread.as_ref() }
    }

    /// Возвращает запись, которой принадлежит элемент `elem`.
    ///
    /// # Safety
    ///
    /// `elem` должен быть полем [`Waiter::elem`] живой записи.
    unsafe fn from_elem(elem: &ListElem) -> &Waiter {
        unsafe { list_entry!(elem, Waiter, elem) }
    }
}

#[pinned_drop]
impl PinnedDrop for Waiter {
    /// Запись нельзя разрушать, пока она стоит в списке [`Condition::waiters`].
    fn drop(self: Pin<&mut Self>) {
        assert!(
            self.elem.is_detached(),
            "a condition waiter is dropped while it is still queued",
        );
    }
}

/// Упорядочивает элементы [`Waiter::elem`] по убыванию приоритета ждущих потоков.
fn by_priority(
    a: &ListElem,
    b: &ListElem,
) -> bool {
    // SAFETY: в списке состоят только `Waiter::elem`.
    unsafe { Waiter::from_elem(a).thread().priority() > Waiter::from_elem(b).thread().priority() }
}
