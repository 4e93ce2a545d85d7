use core::ptr;

use static_assertions::const_assert;

use super::Lock;
use crate::{
    collections::{
        List,
        ListElem,
    },
    log::debug,
    thread::Thread,
};

/// Максимальная длина цепочки владельцев блокировок,
/// по которой распространяется пожертвованный приоритет.
pub const MAX_DEPTH: usize = 8;

const_assert!(MAX_DEPTH > 0);

/// Жертвует приоритет потока `thread` владельцу блокировки, которую он ждёт,
/// затем владельцу блокировки, которую ждёт тот, и так далее,
/// но не дальше [`MAX_DEPTH`] шагов.
///
/// Пожертвование только повышает приоритет владельца.
pub(crate) fn donate(thread: &Thread) {
    let mut donor = thread;

    for depth in 0 .. MAX_DEPTH {
        let Some(lock) = donor.waiting_on() else {
            break;
        };
        let Some(holder) = lock.holder() else {
            break;
        };

        if holder.priority() < donor.priority() {
            debug!(
                %donor,
                %holder,
                depth,
                from = %holder.priority(),
                to = %donor.priority(),
                "donate priority",
            );
            holder.set_priority(donor.priority());
        }

        donor = holder;
    }
}

/// Удаляет из списка доноров потока `thread` всех, кто ждёт блокировку `lock`.
pub(crate) fn revoke(
    thread: &Thread,
    lock: &Lock,
) {
    let donations = thread.donations();
    let mut elem = donations.begin();

    while !ptr::eq(elem, donations.end()) {
        // SAFETY: в списках доноров состоят только `Thread::donation_elem`.
        let donor = unsafe { Thread::from_donation_elem(elem) };

        elem = if donor.waiting_on().is_some_and(|waited| ptr::eq(waited, lock)) {
            debug!(%thread, %donor, "revoke donation");
            List::remove(elem)
        } else {
            elem.next()
        };
    }
}

/// Пересчитывает эффективный приоритет потока `thread`:
/// максимум из его собственного приоритета и приоритетов оставшихся доноров.
pub(crate) fn reset_priority(thread: &Thread) {
    let old = thread.priority();
    thread.set_priority(thread.base_priority());

    let donations = thread.donations();
    if !donations.is_empty() {
        donations.sort(by_priority);

        // SAFETY: в списках доноров состоят только `Thread::donation_elem`.
        let top = unsafe { Thread::from_donation_elem(donations.front()) };
        if top.priority() > thread.priority() {
            thread.set_priority(top.priority());
        }
    }

    if old != thread.priority() {
        debug!(%thread, from = %old, to = %thread.priority(), "reset priority");
    }
}

/// Упорядочивает элементы [`Thread::donation_elem`] по убыванию приоритета потоков.
fn by_priority(
    a: &ListElem,
    b: &ListElem,
) -> bool {
    // SAFETY: в списках доноров состоят только `Thread::donation_elem`.
    unsafe { Thread::from_donation_elem(a).priority() > Thread::from_donation_elem(b).priority() }
}
