//! Translation of evdev key codes into terminal input bytes.
//!
//! The peer ships an XKB keymap, but for a terminal front end a fixed US
//! layout covers what matters. Modifier state comes from the peer's
//! `modifiers` event, whose masks follow the default keymap.

use waylite_protocol::Modifiers;

const KEY_ESC: u32 = 1;
const KEY_BACKSPACE: u32 = 14;
const KEY_TAB: u32 = 15;
const KEY_ENTER: u32 = 28;
const KEY_SPACE: u32 = 57;
const KEY_KPENTER: u32 = 96;
const KEY_HOME: u32 = 102;
const KEY_UP: u32 = 103;
const KEY_PAGEUP: u32 = 104;
const KEY_LEFT: u32 = 105;
const KEY_RIGHT: u32 = 106;
const KEY_END: u32 = 107;
const KEY_DOWN: u32 = 108;
const KEY_PAGEDOWN: u32 = 109;
const KEY_INSERT: u32 = 110;
const KEY_DELETE: u32 = 111;

/// (unshifted, shifted) characters for the printable keys.
fn printable(key: u32) -> Option<(u8, u8)> {
    let pair = match key {
        2 => (b'1', b'!'),
        3 => (b'2', b'@'),
        4 => (b'3', b'#'),
        5 => (b'4', b'$'),
        6 => (b'5', b'%'),
        7 => (b'6', b'^'),
        8 => (b'7', b'&'),
        9 => (b'8', b'*'),
        10 => (b'9', b'('),
        11 => (b'0', b')'),
        12 => (b'-', b'_'),
        13 => (b'=', b'+'),
        16 => (b'q', b'Q'),
        17 => (b'w', b'W'),
        18 => (b'e', b'E'),
        19 => (b'r', b'R'),
        20 => (b't', b'T'),
        21 => (b'y', b'Y'),
        22 => (b'u', b'U'),
        23 => (b'i', b'I'),
        24 => (b'o', b'O'),
        25 => (b'p', b'P'),
        26 => (b'[', b'{'),
        27 => (b']', b'}'),
        30 => (b'a', b'A'),
        31 => (b's', b'S'),
        32 => (b'd', b'D'),
        33 => (b'f', b'F'),
        34 => (b'g', b'G'),
        35 => (b'h', b'H'),
        36 => (b'j', b'J'),
        37 => (b'k', b'K'),
        38 => (b'l', b'L'),
        39 => (b';', b':'),
        40 => (b'\'', b'"'),
        41 => (b'`', b'~'),
        43 => (b'\\', b'|'),
        44 => (b'z', b'Z'),
        45 => (b'x', b'X'),
        46 => (b'c', b'C'),
        47 => (b'v', b'V'),
        48 => (b'b', b'B'),
        49 => (b'n', b'N'),
        50 => (b'm', b'M'),
        51 => (b',', b'<'),
        52 => (b'.', b'>'),
        53 => (b'/', b'?'),
        KEY_SPACE => (b' ', b' '),
        _ => return None,
    };
    Some(pair)
}

fn special(key: u32) -> Option<&'static [u8]> {
    Some(match key {
        KEY_ESC => b"\x1b",
        KEY_BACKSPACE => b"\x7f",
        KEY_TAB => b"\t",
        KEY_ENTER | KEY_KPENTER => b"\r",
        KEY_UP => b"\x1b[A",
        KEY_DOWN => b"\x1b[B",
        KEY_RIGHT => b"\x1b[C",
        KEY_LEFT => b"\x1b[D",
        KEY_HOME => b"\x1b[H",
        KEY_END => b"\x1b[F",
        KEY_INSERT => b"\x1b[2~",
        KEY_DELETE => b"\x1b[3~",
        KEY_PAGEUP => b"\x1b[5~",
        KEY_PAGEDOWN => b"\x1b[6~",
        _ => return None,
    })
}

/// Keyboard modifier state plus the translation table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyboardState {
    modifiers: Modifiers,
}

impl KeyboardState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a `modifiers` event.
    pub fn set_modifiers(&mut self, depressed: u32, latched: u32, locked: u32) {
        self.modifiers = Modifiers::from_bits_truncate(depressed | latched | locked);
    }

    #[must_use]
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Forget held modifiers, e.g. when focus leaves the surface.
    pub fn reset(&mut self) {
        self.modifiers = Modifiers::empty();
    }

    /// Bytes a key press produces, or `None` for releases and keys without a
    /// mapping.
    #[must_use]
    pub fn translate(&self, key: u32, pressed: bool) -> Option<Vec<u8>> {
        if !pressed {
            return None;
        }
        if let Some(seq) = special(key) {
            return Some(seq.to_vec());
        }

        let (plain, shifted) = printable(key)?;
        let shift = self.modifiers.contains(Modifiers::SHIFT);
        let caps = self.modifiers.contains(Modifiers::CAPS_LOCK);

        let mut byte = if plain.is_ascii_lowercase() {
            if shift ^ caps { shifted } else { plain }
        } else if shift {
            shifted
        } else {
            plain
        };

        if self.modifiers.contains(Modifiers::CONTROL) {
            byte = match byte {
                b'a'..=b'z' | b'A'..=b'Z' => byte.to_ascii_lowercase() & 0x1f,
                b'[' | b'{' => 0x1b,
                b'\\' | b'|' => 0x1c,
                b']' | b'}' => 0x1d,
                b' ' | b'@' | b'2' => 0x00,
                b'/' | b'_' => 0x1f,
                _ => byte,
            };
        }

        let mut out = Vec::with_capacity(2);
        if self.modifiers.contains(Modifiers::ALT) {
            out.push(0x1b);
        }
        out.push(byte);
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(mods: Modifiers) -> KeyboardState {
        let mut s = KeyboardState::new();
        s.set_modifiers(mods.bits(), 0, 0);
        s
    }

    #[test]
    fn test_plain_letters_and_digits() {
        let s = KeyboardState::new();
        assert_eq!(s.translate(30, true), Some(b"a".to_vec()));
        assert_eq!(s.translate(2, true), Some(b"1".to_vec()));
        assert_eq!(s.translate(KEY_SPACE, true), Some(b" ".to_vec()));
    }

    #[test]
    fn test_release_produces_nothing() {
        assert_eq!(KeyboardState::new().translate(30, false), None);
    }

    #[test]
    fn test_shift_and_caps_lock() {
        assert_eq!(state(Modifiers::SHIFT).translate(30, true), Some(b"A".to_vec()));
        assert_eq!(state(Modifiers::SHIFT).translate(2, true), Some(b"!".to_vec()));
        assert_eq!(state(Modifiers::CAPS_LOCK).translate(30, true), Some(b"A".to_vec()));
        // Caps lock does not shift digits
        assert_eq!(state(Modifiers::CAPS_LOCK).translate(2, true), Some(b"1".to_vec()));
        assert_eq!(
            state(Modifiers::SHIFT | Modifiers::CAPS_LOCK).translate(30, true),
            Some(b"a".to_vec())
        );
    }

    #[test]
    fn test_control_chords() {
        let ctrl = state(Modifiers::CONTROL);
        assert_eq!(ctrl.translate(46, true), Some(vec![0x03]));
        assert_eq!(ctrl.translate(32, true), Some(vec![0x04]));
        assert_eq!(ctrl.translate(26, true), Some(vec![0x1b]));
        assert_eq!(
            state(Modifiers::CONTROL | Modifiers::SHIFT).translate(46, true),
            Some(vec![0x03])
        );
    }

    #[test]
    fn test_alt_prefixes_escape() {
        assert_eq!(state(Modifiers::ALT).translate(49, true), Some(b"\x1bn".to_vec()));
    }

    #[test]
    fn test_special_keys() {
        let s = KeyboardState::new();
        assert_eq!(s.translate(KEY_ENTER, true), Some(b"\r".to_vec()));
        assert_eq!(s.translate(KEY_BACKSPACE, true), Some(vec![0x7f]));
        assert_eq!(s.translate(KEY_TAB, true), Some(b"\t".to_vec()));
        assert_eq!(s.translate(KEY_ESC, true), Some(vec![0x1b]));
        assert_eq!(s.translate(KEY_UP, true), Some(b"\x1b[A".to_vec()));
        assert_eq!(s.translate(KEY_LEFT, true), Some(b"\x1b[D".to_vec()));
        assert_eq!(s.translate(KEY_DELETE, true), Some(b"\x1b[3~".to_vec()));
    }

    #[test]
    fn test_modifier_keys_unmapped() {
        let s = KeyboardState::new();
        // Left shift, left ctrl, F1
        assert_eq!(s.translate(42, true), None);
        assert_eq!(s.translate(29, true), None);
        assert_eq!(s.translate(59, true), None);
    }

    #[test]
    fn test_reset_clears_modifiers() {
        let mut s = state(Modifiers::SHIFT);
        s.reset();
        assert_eq!(s.translate(30, true), Some(b"a".to_vec()));
    }
}
