//! Host-side test doubles for the hardware boundaries

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use usb_device::bus::PollResult;
use usb_device::endpoint::{EndpointAddress, EndpointType};
use usb_device::{UsbDirection, UsbError};

use crate::bootloader::{Fuse, FuseReader, FuseSet, Handoff};
use crate::config::{CDC_RX_ENDPOINT, CDC_TX_ENDPOINT};
use crate::drivers::usb_channel::Detach;
use crate::error::{Error, Result};
use crate::logger::{Level, Log};
use crate::protocol::{ChannelState, Endpoint, PacketChannel};

/// Packet recorder standing in for the USB stack.
///
/// Only the console data endpoints carry data; touching data on any other
/// selection panics, which catches selection bugs in the code under test.
pub struct MockChannel {
    max_packet: usize,
    state: ChannelState,
    configure_after: Option<usize>,
    selected: Endpoint,
    tx_bank: Vec<u8>,
    rx_queue: VecDeque<Vec<u8>>,
    rx_read: usize,
    ready_fails: bool,
    pub packets: Vec<Vec<u8>>,
    pub writes: usize,
    pub waits: usize,
    pub services: usize,
    pub discarded: usize,
    pub disabled: bool,
}

impl MockChannel {
    /// Configured channel with the given data endpoint size
    pub fn new(max_packet: usize) -> Self {
        Self {
            max_packet,
            state: ChannelState::Configured,
            configure_after: None,
            selected: Endpoint::CONTROL,
            tx_bank: Vec::new(),
            rx_queue: VecDeque::new(),
            rx_read: 0,
            ready_fails: false,
            packets: Vec::new(),
            writes: 0,
            waits: 0,
            services: 0,
            discarded: 0,
            disabled: false,
        }
    }

    pub fn unconfigured(max_packet: usize) -> Self {
        Self {
            state: ChannelState::Default,
            ..Self::new(max_packet)
        }
    }

    /// Become configured after `ticks` calls to `service`
    pub fn configure_after(mut self, ticks: usize) -> Self {
        self.configure_after = Some(ticks);
        self
    }

    pub fn fail_ready(&mut self) {
        self.ready_fails = true;
    }

    pub fn queue_packet(&mut self, data: &[u8]) {
        self.rx_queue.push_back(data.to_vec());
    }

    pub fn output(&self) -> Vec<u8> {
        self.packets.concat()
    }

    pub fn output_str(&self) -> String {
        String::from_utf8(self.output()).expect("console output is ASCII")
    }

    pub fn clear_output(&mut self) {
        self.packets.clear();
    }

    pub fn empty_packets(&self) -> usize {
        self.packets.iter().filter(|p| p.is_empty()).count()
    }

    fn rx_remaining(&self) -> usize {
        self.rx_queue
            .front()
            .map_or(0, |packet| packet.len() - self.rx_read)
    }

    fn assert_selected(&self, endpoint: Endpoint) {
        assert_eq!(
            self.selected.number(),
            endpoint.number(),
            "data access on endpoint {:#04x}",
            self.selected.address()
        );
    }
}

impl PacketChannel for MockChannel {
    fn max_packet_size(&self) -> usize {
        self.max_packet
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    fn service(&mut self) {
        self.services += 1;
        if let Some(remaining) = self.configure_after {
            if remaining <= 1 {
                self.configure_after = None;
                self.state = ChannelState::Configured;
            } else {
                self.configure_after = Some(remaining - 1);
            }
        }
    }

    fn selected(&self) -> Endpoint {
        self.selected
    }

    fn select(&mut self, endpoint: Endpoint) {
        self.selected = endpoint;
    }

    fn is_read_write_allowed(&self) -> bool {
        if self.selected.number() == CDC_TX_ENDPOINT.number() {
            self.tx_bank.len() < self.max_packet
        } else {
            self.rx_remaining() > 0
        }
    }

    fn write_byte(&mut self, byte: u8) {
        self.assert_selected(CDC_TX_ENDPOINT);
        assert!(self.tx_bank.len() < self.max_packet, "IN bank overrun");
        self.tx_bank.push(byte);
        self.writes += 1;
    }

    fn bytes_in_endpoint(&self) -> usize {
        if self.selected.number() == CDC_TX_ENDPOINT.number() {
            self.tx_bank.len()
        } else {
            self.rx_remaining()
        }
    }

    fn clear_in(&mut self) {
        self.assert_selected(CDC_TX_ENDPOINT);
        self.packets.push(std::mem::take(&mut self.tx_bank));
    }

    fn wait_until_ready(&mut self) -> Result<()> {
        self.waits += 1;
        if self.state != ChannelState::Configured {
            return Err(Error::Disconnected);
        }
        if self.ready_fails {
            return Err(Error::Timeout);
        }
        Ok(())
    }

    fn is_out_received(&self) -> bool {
        self.assert_selected(CDC_RX_ENDPOINT);
        !self.rx_queue.is_empty()
    }

    fn read_byte(&mut self) -> u8 {
        self.assert_selected(CDC_RX_ENDPOINT);
        let byte = self
            .rx_queue
            .front()
            .and_then(|packet| packet.get(self.rx_read).copied())
            .expect("read past end of OUT packet");
        self.rx_read += 1;
        byte
    }

    fn clear_out(&mut self) {
        self.assert_selected(CDC_RX_ENDPOINT);
        self.discarded += self.rx_remaining();
        self.rx_queue.pop_front();
        self.rx_read = 0;
    }

    fn disable(&mut self) {
        self.disabled = true;
        self.state = ChannelState::Unattached;
    }
}

#[derive(Default)]
struct BusState {
    next_index: u8,
    setups: VecDeque<[u8; 8]>,
    outs: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    busy_writes: usize,
    detached: bool,
}

/// In-memory USB bus for driving `usb-device` without hardware.
///
/// Control traffic on endpoint 0 comes from queued setup packets. Every
/// other OUT endpoint reads from one shared packet queue and every other IN
/// endpoint records into one shared list.
#[derive(Default)]
pub struct FakeBus {
    state: Mutex<BusState>,
}

impl FakeBus {
    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().expect("bus state poisoned")
    }

    pub fn queue_setup(&self, packet: [u8; 8]) {
        self.lock().setups.push_back(packet);
    }

    pub fn queue_out(&self, data: &[u8]) {
        self.lock().outs.push_back(data.to_vec());
    }

    /// Refuse the next `writes` data packets with `WouldBlock`
    pub fn set_busy(&self, writes: usize) {
        self.lock().busy_writes = writes;
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.lock().written.clone()
    }

    pub fn is_detached(&self) -> bool {
        self.lock().detached
    }
}

impl usb_device::bus::UsbBus for FakeBus {
    fn alloc_ep(
        &mut self,
        ep_dir: UsbDirection,
        ep_addr: Option<EndpointAddress>,
        _ep_type: EndpointType,
        _max_packet_size: u16,
        _interval: u8,
    ) -> usb_device::Result<EndpointAddress> {
        if let Some(addr) = ep_addr {
            return Ok(addr);
        }
        let state = self.state.get_mut().expect("bus state poisoned");
        state.next_index += 1;
        Ok(EndpointAddress::from_parts(state.next_index as usize, ep_dir))
    }

    fn enable(&mut self) {}

    fn reset(&self) {}

    fn set_device_address(&self, _addr: u8) {}

    fn write(&self, ep_addr: EndpointAddress, buf: &[u8]) -> usb_device::Result<usize> {
        if ep_addr.index() == 0 {
            return Ok(buf.len());
        }
        let mut state = self.lock();
        if state.busy_writes > 0 {
            state.busy_writes -= 1;
            return Err(UsbError::WouldBlock);
        }
        state.written.push(buf.to_vec());
        Ok(buf.len())
    }

    fn read(&self, ep_addr: EndpointAddress, buf: &mut [u8]) -> usb_device::Result<usize> {
        let mut state = self.lock();
        let packet = if ep_addr.index() == 0 {
            state.setups.pop_front().map(|setup| setup.to_vec())
        } else {
            state.outs.pop_front()
        };
        let packet = packet.ok_or(UsbError::WouldBlock)?;
        if packet.len() > buf.len() {
            return Err(UsbError::BufferOverflow);
        }
        buf[..packet.len()].copy_from_slice(&packet);
        Ok(packet.len())
    }

    fn set_stalled(&self, _ep_addr: EndpointAddress, _stalled: bool) {}

    fn is_stalled(&self, _ep_addr: EndpointAddress) -> bool {
        false
    }

    fn suspend(&self) {}

    fn resume(&self) {}

    fn poll(&self) -> PollResult {
        if self.lock().setups.is_empty() {
            PollResult::None
        } else {
            PollResult::Data {
                ep_out: 0,
                ep_in_complete: 0,
                ep_setup: 1,
            }
        }
    }
}

impl Detach for FakeBus {
    fn detach(&self) {
        self.lock().detached = true;
    }
}

/// Fuse reader returning fixed bytes and tracking interrupt masking
pub struct MockFuses {
    pub set: FuseSet,
    masked: Cell<bool>,
    pub masked_sections: Cell<usize>,
    pub unmasked_reads: Cell<usize>,
}

impl MockFuses {
    pub fn new(set: FuseSet) -> Self {
        Self {
            set,
            masked: Cell::new(false),
            masked_sections: Cell::new(0),
            unmasked_reads: Cell::new(0),
        }
    }
}

impl FuseReader for MockFuses {
    fn read(&self, fuse: Fuse) -> u8 {
        if !self.masked.get() {
            self.unmasked_reads.set(self.unmasked_reads.get() + 1);
        }
        match fuse {
            Fuse::Low => self.set.low,
            Fuse::High => self.set.high,
            Fuse::Extended => self.set.extended,
            Fuse::Lock => self.set.lock,
        }
    }

    fn with_interrupts_masked<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        let outer = self.masked.replace(true);
        self.masked_sections.set(self.masked_sections.get() + 1);
        let result = f(self);
        self.masked.set(outer);
        result
    }
}

/// Handoff that aborts the test instead of leaving the program
#[derive(Default)]
pub struct PanicHandoff {
    pub masked: bool,
}

impl Handoff for PanicHandoff {
    fn mask_interrupts(&mut self) {
        self.masked = true;
    }

    fn jump(&mut self, word_address: u16) -> ! {
        panic!("jump to {:#06x}", word_address)
    }
}

/// Log sink collecting lines in memory
#[derive(Default)]
pub struct MemoryLog {
    pub lines: Vec<String>,
    current: String,
}

impl ufmt::uWrite for MemoryLog {
    type Error = core::convert::Infallible;

    fn write_str(&mut self, s: &str) -> core::result::Result<(), Self::Error> {
        self.current.push_str(s);
        Ok(())
    }
}

impl Log for MemoryLog {
    fn enabled(&self, _level: Level) -> bool {
        true
    }

    fn begin(&mut self, level: Level) {
        self.current.push_str(level.tag());
    }

    fn end(&mut self) {
        self.lines.push(std::mem::take(&mut self.current));
    }
}
