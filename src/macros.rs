#![allow(unused_macros)]

/// Helper macro for locking items, propagating poisoning as [`crate::Error::LockError`]
///
/// ```rust, ignore
///  let mut guard = lock!(self.write_lock);
///  guard.push(entry);
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().map_err(|_| crate::Error::LockError)?
    };
}

/// Helper macro for reading locked items, propagating poisoning as [`crate::Error::LockError`]
///
/// ```rust, ignore
///  let data = read_lock!(object.inner);
///  println!("{}", data.slots.len());
/// ```
macro_rules! read_lock {
    ($rwlock:expr) => {
        $rwlock.read().map_err(|_| crate::Error::LockError)?
    };
}

/// Helper macro for writing to locked items, propagating poisoning as [`crate::Error::LockError`]
///
/// ```rust, ignore
///  let mut data = write_lock!(object.inner);
///  data.slots[0] = Value::Null;
/// ```
macro_rules! write_lock {
    ($rwlock:expr) => {
        $rwlock.write().map_err(|_| crate::Error::LockError)?
    };
}
