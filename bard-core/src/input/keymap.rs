//! QWERTY layout for playing notes 36..=96 from a computer keyboard.
//!
//! White keys run along the digit row and then the letter rows; the sharp of
//! a key is the same key with Shift. Key codes are the uppercase ASCII codes.

pub const SHIFT: u16 = 160;
pub const CTRL: u16 = 162;

/// Field contents longer than this are cleared after processing.
pub const CAPTURE_LIMIT: usize = 64;

/// A single key press, optionally with a modifier held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCombo {
    pub modifier: Option<u16>,
    pub key: u16,
}

const fn plain(note: u8, key: u8) -> (u8, KeyCombo) {
    (
        note,
        KeyCombo {
            modifier: None,
            key: key as u16,
        },
    )
}

const fn shift(note: u8, key: u8) -> (u8, KeyCombo) {
    (
        note,
        KeyCombo {
            modifier: Some(SHIFT),
            key: key as u16,
        },
    )
}

/// Ascending by note.
const LAYOUT: [(u8, KeyCombo); 61] = [
    plain(36, b'1'),
    shift(37, b'1'),
    plain(38, b'2'),
    shift(39, b'2'),
    plain(40, b'3'),
    plain(41, b'4'),
    shift(42, b'4'),
    plain(43, b'5'),
    shift(44, b'5'),
    plain(45, b'6'),
    shift(46, b'6'),
    plain(47, b'7'),
    plain(48, b'8'),
    shift(49, b'8'),
    plain(50, b'9'),
    shift(51, b'9'),
    plain(52, b'0'),
    plain(53, b'Q'),
    shift(54, b'Q'),
    plain(55, b'W'),
    shift(56, b'W'),
    plain(57, b'E'),
    shift(58, b'E'),
    plain(59, b'R'),
    plain(60, b'T'),
    shift(61, b'T'),
    plain(62, b'Y'),
    shift(63, b'Y'),
    plain(64, b'U'),
    plain(65, b'I'),
    shift(66, b'I'),
    plain(67, b'O'),
    shift(68, b'O'),
    plain(69, b'P'),
    shift(70, b'P'),
    plain(71, b'A'),
    plain(72, b'S'),
    shift(73, b'S'),
    plain(74, b'D'),
    shift(75, b'D'),
    plain(76, b'F'),
    plain(77, b'G'),
    shift(78, b'G'),
    plain(79, b'H'),
    shift(80, b'H'),
    plain(81, b'J'),
    shift(82, b'J'),
    plain(83, b'K'),
    plain(84, b'L'),
    shift(85, b'L'),
    plain(86, b'Z'),
    shift(87, b'Z'),
    plain(88, b'X'),
    plain(89, b'C'),
    shift(90, b'C'),
    plain(91, b'V'),
    shift(92, b'V'),
    plain(93, b'B'),
    shift(94, b'B'),
    plain(95, b'N'),
    plain(96, b'M'),
];

/// Shifted keys whose sharp would be a white key (E#, B#) play that white key.
const ENHARMONICS: [(u16, u8); 3] = [(b'3' as u16, 41), (b'7' as u16, 48), (b'0' as u16, 53)];

/// Note for a bare key code. Shared keys resolve to the unshifted note.
pub fn note_for_key(key: u16) -> Option<u8> {
    LAYOUT
        .iter()
        .find(|(_, combo)| combo.key == key)
        .map(|(note, _)| *note)
}

pub fn note_for_combo(modifier: Option<u16>, key: u16) -> Option<u8> {
    if modifier == Some(SHIFT) {
        if let Some((_, note)) = ENHARMONICS.iter().find(|(k, _)| *k == key) {
            return Some(*note);
        }
    }
    LAYOUT
        .iter()
        .find(|(_, combo)| combo.key == key && combo.modifier == modifier)
        .map(|(note, _)| *note)
}

pub fn keys_for_note(note: u8) -> Option<KeyCombo> {
    LAYOUT
        .iter()
        .find(|(n, _)| *n == note)
        .map(|(_, combo)| *combo)
}

pub fn mapped_notes() -> impl Iterator<Item = u8> {
    LAYOUT.iter().map(|(note, _)| *note)
}

/// Key press a typed character stands for.
fn combo_for_char(c: char) -> Option<KeyCombo> {
    let shifted_digit = match c {
        '!' => Some('1'),
        '@' => Some('2'),
        '#' => Some('3'),
        '$' => Some('4'),
        '%' => Some('5'),
        '^' | '¨' => Some('6'),
        '&' => Some('7'),
        '*' => Some('8'),
        '(' => Some('9'),
        ')' => Some('0'),
        _ => None,
    };
    if let Some(d) = shifted_digit {
        return Some(KeyCombo {
            modifier: Some(SHIFT),
            key: d as u16,
        });
    }
    let upper = c.to_uppercase().next()?;
    let key = u16::try_from(u32::from(upper)).ok()?;
    let modifier = c.is_uppercase().then_some(SHIFT);
    Some(KeyCombo { modifier, key })
}

fn note_for_char(c: char) -> Option<u8> {
    let combo = combo_for_char(c)?;
    match combo.modifier {
        None => note_for_key(combo.key),
        modifier => note_for_combo(modifier, combo.key),
    }
}

/// Notes typed between two states of a text field: every character after the
/// longest common prefix counts as a new key press.
pub fn notes_for_text(previous: &str, current: &str) -> Vec<u8> {
    let common = previous
        .chars()
        .zip(current.chars())
        .take_while(|(a, b)| a == b)
        .count();
    current.chars().skip(common).filter_map(note_for_char).collect()
}

/// Tracks a text-capture field between updates.
#[derive(Debug, Default, Clone)]
pub struct TextCapture {
    last: String,
}

impl TextCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notes for the new field contents. Returns `true` alongside when the
    /// field has grown past [`CAPTURE_LIMIT`] and should be cleared.
    pub fn update(&mut self, current: &str) -> (Vec<u8>, bool) {
        let notes = notes_for_text(&self.last, current);
        let clear = current.chars().count() > CAPTURE_LIMIT;
        if clear {
            self.last.clear();
        } else {
            self.last = current.to_string();
        }
        (notes, clear)
    }
}
