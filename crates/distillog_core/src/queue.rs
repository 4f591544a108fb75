//! Fila de amostras entre o worker e o controlador.
//!
//! Um único mutex, mantido só durante o push ou a troca do buffer.

use crate::types::DecodedSample;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct SampleQueue {
    samples: Mutex<Vec<DecodedSample>>,
}

impl SampleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, sample: DecodedSample) {
        self.lock().push(sample);
    }

    /// Esvazia a fila e retorna o conteúdo anterior, em ordem de chegada.
    pub fn drain(&self) -> Vec<DecodedSample> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DecodedSample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
