//! Extra sign data derived from a physical tag.
//!
//! Signed tags bind their signature to the tag they were written to: the
//! writer appends the tag UID (plus a technology suffix) to the signed
//! message, and the reader appends the UID of the tag it is reading. A copy
//! of the data on a different tag therefore fails verification.
//!
//! | Technology        | Suffix |
//! |-------------------|--------|
//! | MIFARE Ultralight | `0xAA` |
//! | MIFARE Classic    | `0xBB` |
//! | anything else     | none   |
//!
//! # Example
//!
//! ```
//! use flagcarrier_core::challenge::{TagTechnology, extra_sign_data};
//!
//! let tech = TagTechnology::from_tech_list(&[
//!     "android.nfc.tech.NfcA",
//!     "android.nfc.tech.MifareUltralight",
//! ]);
//! assert_eq!(tech, Some(TagTechnology::MifareUltralight));
//! assert_eq!(extra_sign_data(&[0x04, 0x11], tech), vec![0x04, 0x11, 0xAA]);
//! ```

/// Technology class name reported for MIFARE Ultralight tags.
pub const MIFARE_ULTRALIGHT_TECH: &str = "android.nfc.tech.MifareUltralight";

/// Technology class name reported for MIFARE Classic tags.
pub const MIFARE_CLASSIC_TECH: &str = "android.nfc.tech.MifareClassic";

/// A tag technology with its own challenge suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagTechnology {
    /// MIFARE Ultralight (and NTAG).
    MifareUltralight,
    /// MIFARE Classic.
    MifareClassic,
}

impl TagTechnology {
    /// Picks the recognized technology out of a tag's technology list.
    ///
    /// Ultralight takes precedence when a tag reports both.
    #[must_use]
    pub fn from_tech_list<S: AsRef<str>>(techs: &[S]) -> Option<Self> {
        let has = |name: &str| techs.iter().any(|t| t.as_ref() == name);

        if has(MIFARE_ULTRALIGHT_TECH) {
            Some(Self::MifareUltralight)
        } else if has(MIFARE_CLASSIC_TECH) {
            Some(Self::MifareClassic)
        } else {
            None
        }
    }

    /// Returns the byte appended to the UID for this technology.
    #[must_use]
    pub const fn suffix(self) -> u8 {
        match self {
            Self::MifareUltralight => 0xAA,
            Self::MifareClassic => 0xBB,
        }
    }
}

/// Builds the extra sign data for a tag: its UID, followed by the technology
/// suffix when the technology is recognized.
#[must_use]
pub fn extra_sign_data(uid: &[u8], technology: Option<TagTechnology>) -> Vec<u8> {
    let mut data = Vec::with_capacity(uid.len() + 1);
    data.extend_from_slice(uid);
    if let Some(tech) = technology {
        data.push(tech.suffix());
    }
    data
}
