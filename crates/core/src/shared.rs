//! Thread-shareable handles around the payloader and depayloader.
//!
//! The state machines themselves are single-owner. A pipeline that resets
//! them from a control thread (flush, seek, stream restart) while a
//! streaming thread feeds data clones one of these handles into each
//! context; the mutex serializes the two.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::Result;
use crate::rtp::{Depayloader, Fragment, FragmentSink, Payloader, PayloaderConfig};

#[derive(Debug, Clone, Default)]
pub struct SharedPayloader {
    inner: Arc<Mutex<Payloader>>,
}

impl SharedPayloader {
    pub fn new(config: PayloaderConfig) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(Payloader::with_config(config)?)),
        })
    }

    pub fn handle_buffer(&self, data: &[u8], pts: Option<u64>, dts: Option<u64>) -> Vec<Fragment> {
        self.inner.lock().handle_buffer(data, pts, dts)
    }

    pub fn push_to<S: FragmentSink>(
        &self,
        data: &[u8],
        pts: Option<u64>,
        dts: Option<u64>,
        sink: &mut S,
    ) -> Result<()> {
        self.inner.lock().push_to(data, pts, dts, sink)
    }

    pub fn reset(&self) {
        self.inner.lock().reset();
    }

    pub fn set_mtu(&self, mtu: usize) -> Result<()> {
        self.inner.lock().set_mtu(mtu)
    }

    /// Run `f` with exclusive access to the payloader.
    pub fn with<R>(&self, f: impl FnOnce(&mut Payloader) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedDepayloader {
    inner: Arc<Mutex<Depayloader>>,
}

impl SharedDepayloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&self, payload: &[u8], marker: bool, discont: bool) -> Option<Bytes> {
        self.inner.lock().process(payload, marker, discont)
    }

    pub fn reset(&self) {
        self.inner.lock().reset();
    }

    pub fn is_waiting_for_start(&self) -> bool {
        self.inner.lock().is_waiting_for_start()
    }

    pub fn in_picture(&self) -> bool {
        self.inner.lock().in_picture()
    }
}
