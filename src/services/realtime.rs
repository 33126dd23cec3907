//! # 변경 피드 허브
//!
//! 커밋된 쓰기마다 `ChangeEvent`를 발행하고, 구독자는 테이블과 이벤트 종류로
//! 걸러서 받습니다. 내부는 `tokio::sync::broadcast` 채널 하나입니다.
//!
//! 전달 보장은 "최선"입니다. 느린 구독자는 이벤트를 놓칠 수 있고(lagged),
//! 같은 이벤트가 다시 발행될 수도 있습니다. 받는 쪽(낙관적 보정기)은
//! 중복/순서 뒤바뀜/누락을 견디도록 만들어져 있습니다.

use tokio::sync::broadcast;

use crate::models::realtime::{ChangeEvent, EventMask, Table};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 이벤트를 발행합니다. 구독자가 없으면 조용히 버려집니다.
    pub fn publish(&self, event: ChangeEvent) {
        let receivers = self.sender.send(event).unwrap_or(0);
        tracing::trace!("change event delivered to {} subscribers", receivers);
    }

    pub fn subscribe(&self, table: Table, mask: EventMask) -> Subscription {
        Subscription {
            table,
            mask,
            receiver: self.sender.subscribe(),
        }
    }

    /// 거르지 않은 원본 수신기. SSE 스트림처럼 직접 필터링하는 쪽에서 씁니다.
    pub fn raw_receiver(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

pub struct Subscription {
    table: Table,
    mask: EventMask,
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    /// 다음으로 조건에 맞는 이벤트. 피드가 닫히면 None.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "change feed subscriber for {:?} lagged, {} events skipped",
                        self.table,
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// 기다리지 않고 이미 도착한 이벤트만 꺼냅니다.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("change feed subscriber lagged, {} events skipped", skipped);
                }
                Err(_) => return None,
            }
        }
    }

    fn accepts(&self, event: &ChangeEvent) -> bool {
        event.table == self.table && self.mask.matches(event.event_type)
    }
}
