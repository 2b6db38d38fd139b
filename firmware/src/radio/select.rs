//! Chip-select framing for one SPI transaction.
//!
//! A [`Selected`] guard holds the line asserted and releases it when dropped,
//! so a transaction abandoned at an `.await` never leaves the co-processor
//! selected.

/// Active-low chip-select line.
pub trait SelectLine {
    fn assert(&mut self);
    fn release(&mut self);
}

#[cfg(target_os = "none")]
impl SelectLine for embassy_rp::gpio::Output<'_> {
    fn assert(&mut self) {
        self.set_low();
    }

    fn release(&mut self) {
        self.set_high();
    }
}

/// Chip select held asserted until dropped.
pub struct Selected<'a, L: SelectLine> {
    line: &'a mut L,
}

impl<'a, L: SelectLine> Selected<'a, L> {
    pub fn assert(line: &'a mut L) -> Self {
        line.assert();
        Self { line }
    }
}

impl<L: SelectLine> Drop for Selected<'_, L> {
    fn drop(&mut self) {
        self.line.release();
    }
}

#[cfg(test)]
mod tests {
    use core::future::{Future, pending};
    use core::pin::pin;
    use core::task::{Context, Poll, Waker};

    use super::*;

    #[derive(Default)]
    struct Line {
        asserted: bool,
        edges: Vec<bool>,
    }

    impl SelectLine for Line {
        fn assert(&mut self) {
            self.asserted = true;
            self.edges.push(true);
        }

        fn release(&mut self) {
            self.asserted = false;
            self.edges.push(false);
        }
    }

    fn transfer(line: &mut Line, fail: bool) -> Result<(), ()> {
        let _selected = Selected::assert(line);
        if fail {
            return Err(());
        }
        Ok(())
    }

    #[test]
    fn released_on_success_and_early_return() {
        let mut line = Line::default();
        assert_eq!(transfer(&mut line, false), Ok(()));
        assert_eq!(transfer(&mut line, true), Err(()));
        assert!(!line.asserted);
        assert_eq!(line.edges, vec![true, false, true, false]);
    }

    #[test]
    fn released_when_a_suspended_transaction_is_dropped() {
        let mut line = Line::default();
        {
            let mut transaction = pin!(async {
                let _selected = Selected::assert(&mut line);
                pending::<()>().await;
            });
            let mut cx = Context::from_waker(Waker::noop());
            assert_eq!(transaction.as_mut().poll(&mut cx), Poll::Pending);
        }
        assert!(!line.asserted);
        assert_eq!(line.edges, vec![true, false]);
    }
}
