#![cfg_attr(target_arch = "avr", no_std, no_main)]

#[cfg(target_arch = "avr")]
mod firmware {
    use panic_halt as _;

    use avr_device::atmega32u4::Peripherals;
    use usb_device::bus::UsbBusAllocator;

    use openhr2_master::application::Menu;
    use openhr2_master::config;
    use openhr2_master::drivers::{CdcChannel, SerialConsole};
    use openhr2_master::hal::{clock_prescale_none, BootJump, Fuses, UsbBus, Watchdog};
    use openhr2_master::info;
    use openhr2_master::os::Scheduler;

    #[avr_device::entry]
    fn main() -> ! {
        let dp = match Peripherals::take() {
            Some(dp) => dp,
            None => loop {},
        };

        Watchdog::new().disable(&dp.CPU, &dp.WDT);
        clock_prescale_none(&dp.CPU);

        #[cfg(feature = "debug")]
        let log = openhr2_master::logger::SerialLog::new(
            openhr2_master::hal::Uart::new(dp.USART1, config::LOG_BAUD),
            openhr2_master::logger::Level::Debug,
        );
        #[cfg(not(feature = "debug"))]
        let log = openhr2_master::logger::NoLog;

        let usb_bus = UsbBusAllocator::new(UsbBus::new(dp.USB_DEVICE, dp.PLL));
        let channel = match CdcChannel::new(&usb_bus) {
            Ok(channel) => channel,
            Err(_) => loop {},
        };
        let mut console = SerialConsole::new(channel, log);
        info!(*console.log(), "OpenHR2 master v{}", env!("CARGO_PKG_VERSION"));

        let mut menu = Menu::new(Fuses::new(), BootJump, config::BOOTLOADER);

        unsafe { avr_device::interrupt::enable() };

        Scheduler::new().run(&mut console, &mut menu)
    }
}

// The firmware only exists for AVR; host builds run the library tests
#[cfg(not(target_arch = "avr"))]
fn main() {}
