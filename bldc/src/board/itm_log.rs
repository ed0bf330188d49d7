use cortex_m::iprintln;
use cortex_m::peripheral::ITM;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// `log` backend writing to ITM stimulus port 0. Blocks on a full FIFO, so only thread-mode
/// code logs; the interrupt handlers record into the fault log instead.
pub struct ItmLogger {
    level: LevelFilter,
}

impl ItmLogger {
    pub const fn new(level: LevelFilter) -> Self {
        ItmLogger { level }
    }
}

impl Log for ItmLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Keep each line whole if a logging handler is ever added.
        cortex_m::interrupt::free(|_| {
            // Safety: port 0 is only written from inside this critical section.
            let itm = unsafe { &mut *(ITM::PTR as *mut cortex_m::peripheral::itm::RegisterBlock) };
            iprintln!(
                &mut itm.stim[0],
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        });
    }

    fn flush(&self) {}
}

pub fn init(logger: &'static ItmLogger) -> Result<(), SetLoggerError> {
    log::set_logger(logger)?;
    log::set_max_level(logger.level);
    Ok(())
}
