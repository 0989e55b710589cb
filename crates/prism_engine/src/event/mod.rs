//! Event bus
//!
//! Code-keyed publish/subscribe with first-handler-wins semantics. The
//! table is fixed and indexed by a 16-bit event code; each entry holds
//! (listener, handler) pairs invoked in registration order until one
//! returns true. Firing is main-thread only; worker threads hand results
//! back through queues, never through this bus.

use thiserror::Error;

/// 16-bit event code
pub type EventCode = u16;

/// Number of addressable event codes
pub const MAX_EVENT_CODES: usize = 0x4000;

/// Engine-reserved event codes
pub mod codes {
    use super::EventCode;

    /// A key was pressed; context carries the 16-bit key code
    pub const KEY_PRESSED: EventCode = 0x01;
    /// A key was released; context carries the 16-bit key code
    pub const KEY_RELEASED: EventCode = 0x02;
    /// Mouse moved; context carries (x, y) as i16
    pub const MOUSE_MOVED: EventCode = 0x03;
    /// Mouse button pressed; context carries (button, x, y)
    pub const BUTTON_PRESSED: EventCode = 0x04;
    /// Mouse button released; context carries (button, x, y)
    pub const BUTTON_RELEASED: EventCode = 0x05;
    /// Mouse drag crossed the drag threshold; context carries (x, y, button)
    pub const MOUSE_DRAG_BEGIN: EventCode = 0x06;
    /// Mouse dragged; context carries (x, y, button)
    pub const MOUSE_DRAGGED: EventCode = 0x07;
    /// Mouse drag ended; context carries (x, y, button)
    pub const MOUSE_DRAG_END: EventCode = 0x08;
    /// The hovered object id changed; context carries the u32 id
    /// (`INVALID_ID` for none)
    pub const OBJECT_HOVER_ID_CHANGED: EventCode = 0x10;
    /// Default render targets must be regenerated (window resize/invalidate)
    pub const DEFAULT_RENDERTARGET_REFRESH_REQUIRED: EventCode = 0x11;
    /// A console variable changed; context carries the name (16 chars max)
    pub const KVAR_CHANGED: EventCode = 0x12;
}

/// 16-byte tagged event payload.
///
/// Mirrors a C tagged union of fixed-width ints/floats/chars; senders and
/// receivers agree on the variant per event code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventContext {
    /// No payload
    None,
    /// Two signed 64-bit values
    I64x2([i64; 2]),
    /// Two unsigned 64-bit values
    U64x2([u64; 2]),
    /// Two 64-bit floats
    F64x2([f64; 2]),
    /// Four signed 32-bit values
    I32x4([i32; 4]),
    /// Four unsigned 32-bit values
    U32x4([u32; 4]),
    /// Four 32-bit floats
    F32x4([f32; 4]),
    /// Eight signed 16-bit values
    I16x8([i16; 8]),
    /// Eight unsigned 16-bit values
    U16x8([u16; 8]),
    /// Sixteen bytes
    U8x16([u8; 16]),
    /// Sixteen characters (NUL padded); used by `KVAR_CHANGED`
    Chars([u8; 16]),
}

impl EventContext {
    /// Build a `Chars` payload from a string, truncated to 16 bytes
    pub fn from_str(name: &str) -> Self {
        let mut chars = [0u8; 16];
        let bytes = name.as_bytes();
        let len = bytes.len().min(16);
        chars[..len].copy_from_slice(&bytes[..len]);
        Self::Chars(chars)
    }
}

/// Identity supplied at registration so duplicates can be rejected.
///
/// Closures have no comparable identity in Rust, so the listener id stands
/// in for the C original's listener pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Handler callback: returns true when the event was consumed
pub type EventHandler = Box<dyn FnMut(EventCode, &EventContext) -> bool>;

/// Errors surfaced by registration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    /// The (code, listener) pair is already registered
    #[error("listener {listener:?} already registered for event code {code:#06x}")]
    DuplicateListener {
        /// Event code the listener attempted to register for
        code: EventCode,
        /// Offending listener
        listener: ListenerId,
    },

    /// The event code is outside the table
    #[error("event code {code:#06x} out of range")]
    CodeOutOfRange {
        /// Offending code
        code: EventCode,
    },

    /// No such registration to remove
    #[error("listener {listener:?} not registered for event code {code:#06x}")]
    NotRegistered {
        /// Event code
        code: EventCode,
        /// Listener that was not found
        listener: ListenerId,
    },
}

struct Registration {
    listener: ListenerId,
    handler: EventHandler,
}

/// Fixed-table event bus
pub struct EventBus {
    entries: Vec<Vec<Registration>>,
}

impl EventBus {
    /// Create an empty bus covering all event codes
    pub fn new() -> Self {
        let mut entries = Vec::with_capacity(MAX_EVENT_CODES);
        entries.resize_with(MAX_EVENT_CODES, Vec::new);
        Self { entries }
    }

    /// Register a handler for an event code.
    ///
    /// Rejects a second registration of the same (code, listener) pair.
    pub fn register(
        &mut self,
        code: EventCode,
        listener: ListenerId,
        handler: EventHandler,
    ) -> Result<(), EventError> {
        let entry = self.entry_mut(code)?;
        if entry.iter().any(|r| r.listener == listener) {
            return Err(EventError::DuplicateListener { code, listener });
        }
        entry.push(Registration { listener, handler });
        Ok(())
    }

    /// Remove a registration
    pub fn unregister(&mut self, code: EventCode, listener: ListenerId) -> Result<(), EventError> {
        let entry = self.entry_mut(code)?;
        let before = entry.len();
        entry.retain(|r| r.listener != listener);
        if entry.len() == before {
            return Err(EventError::NotRegistered { code, listener });
        }
        Ok(())
    }

    /// Remove every registration held by a listener across all codes
    pub fn unregister_all(&mut self, listener: ListenerId) {
        for entry in &mut self.entries {
            entry.retain(|r| r.listener != listener);
        }
    }

    /// Fire an event.
    ///
    /// Handlers run in registration order; the first to return true consumes
    /// the event and later handlers never observe it. Returns true when some
    /// handler consumed the event.
    pub fn fire(&mut self, code: EventCode, context: &EventContext) -> bool {
        let Some(entry) = self.entries.get_mut(code as usize) else {
            log::warn!("fired event with out-of-range code {code:#06x}");
            return false;
        };
        for registration in entry.iter_mut() {
            if (registration.handler)(code, context) {
                return true;
            }
        }
        false
    }

    /// Number of listeners registered for a code
    pub fn listener_count(&self, code: EventCode) -> usize {
        self.entries
            .get(code as usize)
            .map_or(0, Vec::len)
    }

    fn entry_mut(&mut self, code: EventCode) -> Result<&mut Vec<Registration>, EventError> {
        self.entries
            .get_mut(code as usize)
            .ok_or(EventError::CodeOutOfRange { code })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_fire_in_registration_order() {
        let mut bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for id in 0..3u64 {
            let order = Rc::clone(&order);
            bus.register(
                codes::KEY_PRESSED,
                ListenerId(id),
                Box::new(move |_, _| {
                    order.borrow_mut().push(id);
                    false
                }),
            )
            .expect("register");
        }

        bus.fire(codes::KEY_PRESSED, &EventContext::None);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_consumption_stops_forwarding() {
        let mut bus = EventBus::new();
        let reached = Rc::new(RefCell::new(false));

        bus.register(codes::KEY_PRESSED, ListenerId(1), Box::new(|_, _| true))
            .expect("register");
        {
            let reached = Rc::clone(&reached);
            bus.register(
                codes::KEY_PRESSED,
                ListenerId(2),
                Box::new(move |_, _| {
                    *reached.borrow_mut() = true;
                    false
                }),
            )
            .expect("register");
        }

        assert!(bus.fire(codes::KEY_PRESSED, &EventContext::None));
        assert!(!*reached.borrow());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut bus = EventBus::new();
        bus.register(codes::MOUSE_MOVED, ListenerId(9), Box::new(|_, _| false))
            .expect("first registration");

        let result = bus.register(codes::MOUSE_MOVED, ListenerId(9), Box::new(|_, _| false));
        assert_eq!(
            result,
            Err(EventError::DuplicateListener {
                code: codes::MOUSE_MOVED,
                listener: ListenerId(9),
            })
        );
    }

    #[test]
    fn test_unregister_removes_handler() {
        let mut bus = EventBus::new();
        bus.register(codes::KEY_RELEASED, ListenerId(4), Box::new(|_, _| true))
            .expect("register");
        bus.unregister(codes::KEY_RELEASED, ListenerId(4))
            .expect("unregister");

        assert!(!bus.fire(codes::KEY_RELEASED, &EventContext::None));
        assert_eq!(bus.listener_count(codes::KEY_RELEASED), 0);
    }

    #[test]
    fn test_chars_payload_truncates() {
        let EventContext::Chars(chars) =
            EventContext::from_str("a_very_long_kvar_name_indeed")
        else {
            panic!("expected chars payload");
        };
        assert_eq!(&chars[..16], b"a_very_long_kvar");
    }
}
