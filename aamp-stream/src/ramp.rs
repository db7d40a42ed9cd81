//! A weak handle bridging `MediaTrack`'s narrow `RampDownRequester`
//! capability back to `StreamAbstraction`, without `MediaTrack` holding
//! a strong reference to its owner (§9).

use crate::coordinator::StreamAbstraction;
use aamp_track::RampDownRequester;
use std::sync::Weak;

pub struct RampDownHandle(pub(crate) Weak<StreamAbstraction>);

impl RampDownRequester for RampDownHandle {
    fn request_ramp_down(&self) {
        if let Some(stream) = self.0.upgrade() {
            tokio::spawn(async move {
                stream.ramp_down().await;
            });
        }
    }
}
