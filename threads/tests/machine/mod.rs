#![allow(dead_code)]
#![deny(warnings)]

//! Однопроцессорная машина, смоделированная потоками операционной системы.
//!
//! Каждому потоку ядра соответствует свой поток ОС,
//! но исполняется в каждый момент только тот, кому передана эстафета
//! [`State::running`].
//! Флаг прерываний, признак обработчика прерывания и текущий поток ядра
//! хранятся в локальных переменных потока ОС,
//! то есть сохраняются и восстанавливаются при переключении как в настоящем ядре.

use std::{
    cell::Cell,
    panic::{
        self,
        AssertUnwindSafe,
    },
    pin::Pin,
    sync::{
        Arc,
        Condvar,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    thread,
};

use scopeguard::defer;

use threads::{
    Condition,
    InterruptLevel,
    Lock,
    Priority,
    Scheduler,
    Semaphore,
    Thread,
    Tid,
    log::{
        debug,
        error,
        trace,
    },
};

thread_local! {
    static CURRENT: Cell<Option<&'static Thread>> = const { Cell::new(None) };
    static INTERRUPTS: Cell<InterruptLevel> = const { Cell::new(InterruptLevel::On) };
    static IN_INTERRUPT: Cell<bool> = const { Cell::new(false) };
    static YIELD_ON_RETURN: Cell<bool> = const { Cell::new(false) };
}

/// Идентификатор главного потока, который создаёт машину.
const MAIN: Tid = Tid::new(0);

/// Смоделированная машина.
pub struct Machine {
    state: Mutex<State>,
    turn: Condvar,
}

#[derive(Default)]
struct State {
    /// Поток, которому передана эстафета.
    running: Option<Tid>,

    /// Готовые к исполнению потоки в порядке постановки в очередь.
    ready: Vec<&'static Thread>,

    /// Все созданные потоки, включая главный, по их идентификаторам.
    threads: Vec<&'static Thread>,

    /// Количество незавершённых потоков, не считая главного.
    alive: usize,

    /// Главный поток ждёт в [`Machine::join()`].
    joining: bool,

    /// Паники потоков.
    failures: Vec<String>,

    /// Ни один поток не может исполняться.
    deadlock: bool,
}

impl State {
    /// Извлекает из очереди готовых первый поток с наибольшим приоритетом.
    /// Если готовых нет, а главный поток ждёт в [`Machine::join()`], выбирает его.
    fn pick_next(&mut self) -> Option<Tid> {
        let mut best: Option<usize> = None;
        for (index, thread) in self.ready.iter().enumerate() {
            if best.is_none_or(|best| thread.priority() > self.ready[best].priority()) {
                best = Some(index);
            }
        }

        match best {
            Some(index) => Some(self.ready.remove(index).tid()),
            None if self.joining => Some(MAIN),
            None => None,
        }
    }

    /// Передаёт эстафету следующему потоку.
    fn pass_turn(&mut self) {
        self.running = self.pick_next();
        if self.running.is_none() {
            error!(alive = self.alive, "no thread can run");
            self.deadlock = true;
        }
    }
}

impl Machine {
    /// Создаёт машину и делает вызывающий поток ОС её главным потоком
    /// с приоритетом [`Priority::DEFAULT`].
    pub fn new() -> &'static Machine {
        let machine = Box::leak(Box::new(Machine {
            state: Mutex::new(State::default()),
            turn: Condvar::new(),
        }));

        let main = new_thread(MAIN, "main", Priority::DEFAULT);

        let mut state = machine.lock();
        state.threads.push(main);
        state.running = Some(MAIN);
        drop(state);

        CURRENT.set(Some(main));
        INTERRUPTS.set(InterruptLevel::On);
        IN_INTERRUPT.set(false);
        YIELD_ON_RETURN.set(false);

        machine
    }

    /// Создаёт поток ядра с именем `name` и приоритетом `priority`, исполняющий `body`.
    /// Если новый поток важнее текущего, текущий сразу уступает ему процессор.
    pub fn spawn(
        &'static self,
        name: &'static str,
        priority: u8,
        body: impl FnOnce() + Send + 'static,
    ) -> &'static Thread {
        let priority = Priority::new(priority).expect("bad priority");

        let mut state = self.lock();
        let tid = Tid::from(state.threads.len());
        let thread = new_thread(tid, name, priority);
        state.threads.push(thread);
        state.alive += 1;
        state.ready.push(thread);
        drop(state);

        debug!(%thread, %priority, "spawn");

        thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                CURRENT.set(Some(thread));
                INTERRUPTS.set(InterruptLevel::On);

                drop(self.wait_for_turn(self.lock(), tid));

                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
                    let message = panic_message(payload.as_ref());
                    error!(%thread, %message, "thread panicked");
                    self.lock().failures.push(format!("{thread}: {message}"));
                }

                self.exit();
            })
            .expect("failed to start an OS thread");

        if priority > self.current().priority() {
            self.yield_now();
        }

        thread
    }

    /// Ждёт завершения всех потоков, кроме главного.
    ///
    /// # Panics
    ///
    /// Паникует, если оставшиеся потоки заблокированы навсегда
    /// или если хотя бы один из потоков запаниковал.
    pub fn join(&'static self) {
        assert_eq!(self.current().tid(), MAIN, "join() from a spawned thread");

        loop {
            let mut state = self.lock();

            if state.alive == 0 {
                break;
            }

            assert!(
                !state.ready.is_empty(),
                "deadlock: {} threads are blocked forever",
                state.alive,
            );

            state.joining = true;
            state.pass_turn();
            self.turn.notify_all();
            let mut state = self.wait_for_turn(state, MAIN);
            state.joining = false;
        }

        let state = self.lock();
        assert!(state.failures.is_empty(), "threads panicked: {:?}", state.failures);
    }

    /// Меняет собственный приоритет текущего потока.
    /// Уступает процессор, если есть более важный готовый поток.
    pub fn set_priority(
        &self,
        priority: u8,
    ) {
        let priority = Priority::new(priority).expect("bad priority");
        let current = self.current();
        current.set_base_priority(priority);

        let outranked = self.lock().ready.iter().any(|thread| thread.priority() > current.priority());
        if outranked {
            self.yield_now();
        }
    }

    /// Исполняет `handler` как обработчик внешнего прерывания, пришедшего в текущий поток.
    pub fn interrupt(
        &self,
        handler: impl FnOnce(),
    ) {
        assert_eq!(INTERRUPTS.get(), InterruptLevel::On, "interrupts are disabled");
        assert!(!self.in_interrupt(), "nested interrupt");

        let level = self.disable_interrupts();
        IN_INTERRUPT.set(true);
        {
            defer! {
                IN_INTERRUPT.set(false);
            }
            handler();
        }
        self.set_interrupts(level);

        if YIELD_ON_RETURN.replace(false) {
            self.yield_now();
        }
    }

    /// Текущее состояние флага прерываний.
    pub fn interrupts(&self) -> InterruptLevel {
        INTERRUPTS.get()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Передаёт эстафету и ждёт, пока она не вернётся к текущему потоку.
    fn switch(
        &self,
        mut state: MutexGuard<'_, State>,
    ) {
        let tid = self.current().tid();
        state.pass_turn();
        if let Some(next) = state.running {
            trace!(from = %tid, to = %next, "switch");
        }
        self.turn.notify_all();
        drop(self.wait_for_turn(state, tid));
    }

    fn wait_for_turn<'a>(
        &self,
        mut state: MutexGuard<'a, State>,
        tid: Tid,
    ) -> MutexGuard<'a, State> {
        while state.running != Some(tid) {
            assert!(!state.deadlock, "deadlock: no thread can run");
            state = self.turn.wait(state).unwrap_or_else(PoisonError::into_inner);
        }

        state
    }

    fn exit(&self) {
        let mut state = self.lock();
        state.alive -= 1;
        debug!(thread = %self.current(), alive = state.alive, "exit");

        if !state.deadlock {
            state.pass_turn();
            self.turn.notify_all();
        }
    }
}

impl Scheduler for Machine {
    fn current(&self) -> &Thread {
        CURRENT.get().expect("not a thread of the machine")
    }

    fn block(&self) {
        assert_eq!(INTERRUPTS.get(), InterruptLevel::Off, "block() with interrupts enabled");
        assert!(!self.in_interrupt(), "block() in an interrupt handler");

        trace!(thread = %self.current(), "block");
        self.switch(self.lock());
    }

    fn unblock(
        &self,
        thread: &Thread,
    ) {
        let mut state = self.lock();
        let thread = state.threads[usize::from(thread.tid())];
        assert!(
            !state.ready.iter().any(|ready| ready.tid() == thread.tid()),
            "unblock() of a ready thread",
        );
        trace!(%thread, "unblock");
        state.ready.push(thread);
    }

    fn yield_now(&self) {
        assert!(!self.in_interrupt(), "yield_now() in an interrupt handler");

        let mut state = self.lock();
        state.ready.push(CURRENT.get().expect("not a thread of the machine"));
        self.switch(state);
    }

    fn yield_on_return(&self) {
        assert!(self.in_interrupt(), "yield_on_return() outside of an interrupt handler");
        YIELD_ON_RETURN.set(true);
    }

    fn in_interrupt(&self) -> bool {
        IN_INTERRUPT.get()
    }

    fn disable_interrupts(&self) -> InterruptLevel {
        INTERRUPTS.replace(InterruptLevel::Off)
    }

    fn set_interrupts(
        &self,
        level: InterruptLevel,
    ) {
        INTERRUPTS.set(level);
    }
}

/// Журнал событий, которые потоки записывают в порядке наступления.
pub struct Journal<T>(Arc<Mutex<Vec<T>>>);

impl<T: Clone> Journal<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn record(
        &self,
        event: T,
    ) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }

    pub fn events(&self) -> Vec<T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl<T> Clone for Journal<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Закрепляет `value` навсегда.
pub fn leak<T>(value: T) -> Pin<&'static T> {
    Pin::static_ref(Box::leak(Box::new(value)))
}

/// Создаёт инициализированный семафор с начальным значением `value`.
pub fn new_semaphore(value: usize) -> &'static Semaphore {
    let semaphore = leak(Semaphore::new(value));
    semaphore.init();
    semaphore.get_ref()
}

/// Создаёт инициализированную блокировку.
pub fn new_lock() -> &'static Lock {
    let lock = leak(Lock::new());
    lock.init();
    lock.get_ref()
}

/// Создаёт инициализированную условную переменную.
pub fn new_condition() -> &'static Condition {
    let condition = leak(Condition::new());
    condition.init();
    condition.get_ref()
}

fn new_thread(
    tid: Tid,
    name: &'static str,
    priority: Priority,
) -> &'static Thread {
    let thread = leak(Thread::new(tid, name, priority));
    thread.init();
    thread.get_ref()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
