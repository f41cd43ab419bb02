#![allow(dead_code)]

use std::{boxed::Box, cell::RefCell, vec::Vec};

use wifi_txrx::{DmaMapping, FrameId, PendingTx, TxBuf, TxFrame, TxHost, TxRate, TxStatus};

#[derive(Debug, PartialEq, Eq)]
pub struct TestFrame(pub FrameId);
impl TxFrame for TestFrame {
    fn frame_id(&self) -> FrameId {
        self.0
    }
}

/// Records everything the core hands back.
#[derive(Default)]
pub struct TestHost {
    pub unmapped: RefCell<Vec<DmaMapping>>,
    pub freed: RefCell<Vec<TxBuf>>,
    pub completed: RefCell<Vec<(FrameId, TxStatus, Option<TxRate>)>>,
}
impl TestHost {
    pub fn completed_frames(&self) -> Vec<FrameId> {
        self.completed
            .borrow()
            .iter()
            .map(|(frame_id, _, _)| *frame_id)
            .collect()
    }
}
impl TxHost for TestHost {
    type Frame = TestFrame;
    fn dma_unmap(&self, mapping: DmaMapping) {
        self.unmapped.borrow_mut().push(mapping);
    }
    fn txbuf_free(&self, txbuf: TxBuf) {
        self.freed.borrow_mut().push(txbuf);
    }
    fn tx_completed(&self, frame: TestFrame, status: TxStatus, rate: Option<TxRate>) {
        self.completed.borrow_mut().push((frame.0, status, rate));
    }
}

pub fn tx(frame_id: FrameId) -> PendingTx<TestFrame> {
    PendingTx::new(
        TestFrame(frame_id),
        DmaMapping::new(0x3ff0_0000 + frame_id * 0x100, 0x100),
    )
}

pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}
