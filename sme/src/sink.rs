use futures::channel::mpsc::UnboundedSender;
use log::error;

use crate::MlmeRequest;

#[derive(Clone)]
pub struct UnboundedSink<T> {
    sink: UnboundedSender<T>,
}

impl<T> UnboundedSink<T> {
    pub fn new(sink: UnboundedSender<T>) -> Self {
        UnboundedSink { sink }
    }

    pub fn send(&self, msg: T) {
        match self.sink.unbounded_send(msg) {
            Ok(()) => {}
            Err(e) => {
                if e.is_full() {
                    panic!("unbounded channel should never be full");
                } else if e.is_disconnected() {
                    error!("receiver gone; dropping message");
                } else {
                    panic!("unexpected error while sending: {:?}", e);
                }
            }
        }
    }
}

pub type MlmeSink = UnboundedSink<MlmeRequest>;
