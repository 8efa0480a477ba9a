use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use copdo_common::{
    messages::CanMessage,
    traits::{CanBindError, CanDevice, CanRxHandler, CanSendError},
};

/// The number of rx buffers, and the number of tx buffers, provided by the simulated device
pub const N_BUFFERS: usize = 8;

#[derive(Clone, Copy)]
struct RxBinding {
    buffer: usize,
    id: u16,
    mask: u16,
    handler: &'static dyn CanRxHandler,
}

/// The configuration of a tx buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxBinding {
    /// The buffer index
    pub buffer: usize,
    /// The bound CAN ID
    pub id: u16,
    /// The frame length
    pub len: u8,
    /// True if the buffer is reserved for synchronous messages
    pub sync: bool,
}

/// A CAN device which records sent frames, and delivers frames to bound handlers on request
pub struct SimCanDevice {
    rx: Mutex<Vec<RxBinding>>,
    tx: Mutex<Vec<TxBinding>>,
    sent: Mutex<Vec<CanMessage>>,
    fail_sends: AtomicBool,
}

impl Default for SimCanDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimCanDevice {
    pub const fn new() -> Self {
        Self {
            rx: Mutex::new(Vec::new()),
            tx: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// Clear all bindings and recorded frames
    pub fn reset(&self) {
        self.rx.lock().unwrap().clear();
        self.tx.lock().unwrap().clear();
        self.sent.lock().unwrap().clear();
        self.fail_sends.store(false, Ordering::Relaxed);
    }

    /// Make every following send fail, until cleared
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Relaxed);
    }

    /// Deliver a frame to every rx buffer whose filter matches it
    ///
    /// Returns the number of handlers which received it.
    pub fn deliver(&self, msg: CanMessage) -> usize {
        let raw_id = msg.id().raw() as u16;
        let handlers: Vec<&'static dyn CanRxHandler> = self
            .rx
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.id != 0 && (raw_id & b.mask) == (b.id & b.mask))
            .map(|b| b.handler)
            .collect();
        // Handlers are called without holding the lock
        for handler in &handlers {
            handler.on_receive(&msg);
        }
        handlers.len()
    }

    /// Remove and return all frames sent since the last call
    pub fn take_sent(&self) -> Vec<CanMessage> {
        core::mem::take(&mut *self.sent.lock().unwrap())
    }

    /// Get the configuration of a tx buffer
    pub fn tx_binding(&self, buffer: usize) -> Option<TxBinding> {
        self.tx
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.buffer == buffer)
            .copied()
    }

    /// Get the ID an rx buffer is bound to
    pub fn rx_id(&self, buffer: usize) -> Option<u16> {
        self.rx
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.buffer == buffer)
            .map(|b| b.id)
    }
}

impl CanDevice for SimCanDevice {
    fn bind_rx(
        &self,
        buffer: usize,
        id: u16,
        mask: u16,
        handler: &'static dyn CanRxHandler,
    ) -> Result<(), CanBindError> {
        if buffer >= N_BUFFERS {
            return Err(CanBindError::NoSuchBuffer { buffer });
        }
        let mut rx = self.rx.lock().unwrap();
        if id != 0 && rx.iter().any(|b| b.buffer != buffer && b.id == id) {
            return Err(CanBindError::IdInUse { id });
        }
        rx.retain(|b| b.buffer != buffer);
        rx.push(RxBinding {
            buffer,
            id,
            mask,
            handler,
        });
        Ok(())
    }

    fn bind_tx(&self, buffer: usize, id: u16, len: u8, sync: bool) -> Result<(), CanBindError> {
        if buffer >= N_BUFFERS {
            return Err(CanBindError::NoSuchBuffer { buffer });
        }
        let mut tx = self.tx.lock().unwrap();
        tx.retain(|b| b.buffer != buffer);
        tx.push(TxBinding {
            buffer,
            id,
            len,
            sync,
        });
        Ok(())
    }

    fn send(&self, _buffer: usize, msg: CanMessage) -> Result<(), CanSendError> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(CanSendError(msg));
        }
        self.sent.lock().unwrap().push(msg);
        Ok(())
    }
}
