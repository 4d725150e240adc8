use crate::error::PopError;
use crate::trace::warn;
use crate::MPMC::{Consumer, PeerRegistry, Producer, QueueBuilder};
use std::ptr;
use std::sync::Arc;

// Error codes
pub const RQ_OK: i32 = 0;
pub const RQ_ERROR_NULL_POINTER: i32 = -1;
pub const RQ_ERROR_FULL: i32 = -2;
pub const RQ_ERROR_EMPTY: i32 = -3;
pub const RQ_ERROR_BUFFER_TOO_SMALL: i32 = -4;
pub const RQ_ERROR_NO_SLOT: i32 = -5;

/// Handle to a queue (opaque pointer)
pub struct QueueHandle {
    inner: Arc<PeerRegistry>,
}

/// Handle to a producer instance (opaque pointer)
pub struct ProducerHandle {
    inner: Producer,
}

/// Handle to a consumer instance (opaque pointer)
pub struct ConsumerHandle {
    inner: Consumer,
}

fn set_err(err: *mut i32, code: i32) {
    if !err.is_null() {
        unsafe { *err = code };
    }
}

// -----------------------------------------------------------------------------
// Queue API
// -----------------------------------------------------------------------------

/// Create a heap-backed queue.
///
/// # Arguments
/// * `capacity_hint` - Requested ring size; rounded as `2 << highest_bit`.
/// * `producers` - Number of producer slots.
/// * `consumers` - Number of consumer slots.
///
/// # Returns
/// * Pointer to `QueueHandle`, or NULL on failure.
#[no_mangle]
pub extern "C" fn rq_queue_new(capacity_hint: usize, producers: u32, consumers: u32) -> *mut QueueHandle {
    match QueueBuilder::new()
        .with_capacity_hint(capacity_hint)
        .with_producers(producers)
        .with_consumers(consumers)
        .build()
    {
        Ok(registry) => Box::into_raw(Box::new(QueueHandle { inner: registry })),
        Err(_e) => {
            warn!(error = %_e, capacity_hint, producers, consumers, "rq_queue_new failed");
            ptr::null_mut()
        }
    }
}

/// Free a queue handle. Attached producers and consumers stay valid until
/// they are detached.
#[no_mangle]
pub extern "C" fn rq_queue_free(handle: *mut QueueHandle) {
    if !handle.is_null() {
        unsafe {
            let _ = Box::from_raw(handle); // Dropped automatically
        }
    }
}

// -----------------------------------------------------------------------------
// Producer API
// -----------------------------------------------------------------------------

/// Attach a producer.
///
/// # Arguments
/// * `queue` - Pointer to `QueueHandle`.
/// * `err` - Optional out-param; receives RQ_OK, RQ_ERROR_NULL_POINTER or
///   RQ_ERROR_NO_SLOT.
///
/// # Returns
/// * Pointer to `ProducerHandle`, or NULL on failure.
#[no_mangle]
pub extern "C" fn rq_producer_attach(queue: *const QueueHandle, err: *mut i32) -> *mut ProducerHandle {
    if queue.is_null() {
        set_err(err, RQ_ERROR_NULL_POINTER);
        return ptr::null_mut();
    }

    let registry = unsafe { &(*queue).inner };
    match registry.attach_producer() {
        Ok(producer) => {
            set_err(err, RQ_OK);
            Box::into_raw(Box::new(ProducerHandle { inner: producer }))
        }
        Err(_) => {
            set_err(err, RQ_ERROR_NO_SLOT);
            ptr::null_mut()
        }
    }
}

/// Detach and free a producer handle.
#[no_mangle]
pub extern "C" fn rq_producer_detach(handle: *mut ProducerHandle) {
    if !handle.is_null() {
        unsafe {
            let _ = Box::from_raw(handle);
        }
    }
}

/// Push a message.
///
/// # Arguments
/// * `handle` - Pointer to `ProducerHandle`.
/// * `data` - Pointer to data buffer (may be NULL when `len` is 0).
/// * `len` - Length of data.
///
/// # Returns
/// * 0 on success, RQ_ERROR_FULL if the message does not fit.
#[no_mangle]
pub extern "C" fn rq_push(handle: *mut ProducerHandle, data: *const u8, len: usize) -> i32 {
    if handle.is_null() || (data.is_null() && len != 0) {
        return RQ_ERROR_NULL_POINTER;
    }

    let producer = unsafe { &mut (*handle).inner };
    let slice = if len == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(data, len) }
    };

    match producer.push(slice) {
        Ok(()) => RQ_OK,
        Err(_) => RQ_ERROR_FULL,
    }
}

// -----------------------------------------------------------------------------
// Consumer API
// -----------------------------------------------------------------------------

/// Attach a consumer.
///
/// # Arguments
/// * `queue` - Pointer to `QueueHandle`.
/// * `err` - Optional out-param; receives RQ_OK, RQ_ERROR_NULL_POINTER or
///   RQ_ERROR_NO_SLOT.
///
/// # Returns
/// * Pointer to `ConsumerHandle`, or NULL on failure.
#[no_mangle]
pub extern "C" fn rq_consumer_attach(queue: *const QueueHandle, err: *mut i32) -> *mut ConsumerHandle {
    if queue.is_null() {
        set_err(err, RQ_ERROR_NULL_POINTER);
        return ptr::null_mut();
    }

    let registry = unsafe { &(*queue).inner };
    match registry.attach_consumer() {
        Ok(consumer) => {
            set_err(err, RQ_OK);
            Box::into_raw(Box::new(ConsumerHandle { inner: consumer }))
        }
        Err(_) => {
            set_err(err, RQ_ERROR_NO_SLOT);
            ptr::null_mut()
        }
    }
}

/// Detach and free a consumer handle.
#[no_mangle]
pub extern "C" fn rq_consumer_detach(handle: *mut ConsumerHandle) {
    if !handle.is_null() {
        unsafe {
            let _ = Box::from_raw(handle);
        }
    }
}

/// Pop a message.
///
/// # Arguments
/// * `handle` - Pointer to `ConsumerHandle`.
/// * `buf` - Buffer to write the payload into.
/// * `len` - Size of `buf`.
///
/// # Returns
/// * Payload length (>= 0) on success.
/// * RQ_ERROR_EMPTY if no message is available.
/// * RQ_ERROR_BUFFER_TOO_SMALL if the next message exceeds `len`; it stays queued.
#[no_mangle]
pub extern "C" fn rq_pop(handle: *mut ConsumerHandle, buf: *mut u8, len: usize) -> i64 {
    if handle.is_null() || (buf.is_null() && len != 0) {
        return RQ_ERROR_NULL_POINTER as i64;
    }

    let consumer = unsafe { &mut (*handle).inner };
    let out = if len == 0 {
        &mut [][..]
    } else {
        unsafe { std::slice::from_raw_parts_mut(buf, len) }
    };

    match consumer.pop(out) {
        Ok(n) => n as i64,
        Err(PopError::Empty) => RQ_ERROR_EMPTY as i64,
        Err(PopError::CallerBufferTooSmall { .. }) => RQ_ERROR_BUFFER_TOO_SMALL as i64,
    }
}
