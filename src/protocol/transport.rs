//! Endpoint-level transport primitives

use core::ops::{Deref, DerefMut};

use super::{ChannelState, Endpoint};
use crate::error::Result;

/// Packet-oriented, endpoint-addressed byte channel.
///
/// Every data operation acts on the currently selected endpoint. The
/// selection is shared by everything running in the main loop, so callers
/// that change it go through [`Selected`].
pub trait PacketChannel {
    /// Maximum packet size of the data endpoints
    fn max_packet_size(&self) -> usize;

    fn state(&self) -> ChannelState;

    /// Poll the USB stack and move staged packets; must run every tick
    fn service(&mut self);

    fn selected(&self) -> Endpoint;
    fn select(&mut self, endpoint: Endpoint);

    /// Current IN bank can take more bytes / current OUT bank still has bytes
    fn is_read_write_allowed(&self) -> bool;
    fn write_byte(&mut self, byte: u8);
    fn bytes_in_endpoint(&self) -> usize;
    /// Hand the current IN packet to the host
    fn clear_in(&mut self);
    fn wait_until_ready(&mut self) -> Result<()>;

    fn is_out_received(&self) -> bool;
    fn read_byte(&mut self) -> u8;
    /// Release the current OUT packet, discarding unread bytes
    fn clear_out(&mut self);

    /// Detach from the bus and power the controller down
    fn disable(&mut self);
}

/// Scoped endpoint selection; the previous endpoint is reselected on drop.
pub struct Selected<'a, C: PacketChannel> {
    channel: &'a mut C,
    previous: Endpoint,
}

impl<'a, C: PacketChannel> Selected<'a, C> {
    pub fn new(channel: &'a mut C, endpoint: Endpoint) -> Self {
        let previous = channel.selected();
        channel.select(endpoint);
        Self { channel, previous }
    }
}

impl<C: PacketChannel> Deref for Selected<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.channel
    }
}

impl<C: PacketChannel> DerefMut for Selected<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.channel
    }
}

impl<C: PacketChannel> Drop for Selected<'_, C> {
    fn drop(&mut self) {
        self.channel.select(self.previous);
    }
}
