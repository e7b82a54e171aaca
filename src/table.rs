//! Morse character table — character ↔ representation, procedural-signal
//! expansions, and the representation hash used for O(1) reverse lookup.

use crate::error::{CwError, Result};
use std::sync::OnceLock;

/// One entry of the character table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub character: char,
    pub representation: &'static str,
}

/// A procedural signal: printable stand-in character, its textual
/// expansion, and whether callers usually want the expansion spelled out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Procedural {
    pub character: char,
    pub expansion: &'static str,
    pub usually_expanded: bool,
}

const ENTRIES: &[Entry] = &[
    Entry { character: 'A', representation: ".-" },
    Entry { character: 'B', representation: "-..." },
    Entry { character: 'C', representation: "-.-." },
    Entry { character: 'D', representation: "-.." },
    Entry { character: 'E', representation: "." },
    Entry { character: 'F', representation: "..-." },
    Entry { character: 'G', representation: "--." },
    Entry { character: 'H', representation: "...." },
    Entry { character: 'I', representation: ".." },
    Entry { character: 'J', representation: ".---" },
    Entry { character: 'K', representation: "-.-" },
    Entry { character: 'L', representation: ".-.." },
    Entry { character: 'M', representation: "--" },
    Entry { character: 'N', representation: "-." },
    Entry { character: 'O', representation: "---" },
    Entry { character: 'P', representation: ".--." },
    Entry { character: 'Q', representation: "--.-" },
    Entry { character: 'R', representation: ".-." },
    Entry { character: 'S', representation: "..." },
    Entry { character: 'T', representation: "-" },
    Entry { character: 'U', representation: "..-" },
    Entry { character: 'V', representation: "...-" },
    Entry { character: 'W', representation: ".--" },
    Entry { character: 'X', representation: "-..-" },
    Entry { character: 'Y', representation: "-.--" },
    Entry { character: 'Z', representation: "--.." },
    Entry { character: '0', representation: "-----" },
    Entry { character: '1', representation: ".----" },
    Entry { character: '2', representation: "..---" },
    Entry { character: '3', representation: "...--" },
    Entry { character: '4', representation: "....-" },
    Entry { character: '5', representation: "....." },
    Entry { character: '6', representation: "-...." },
    Entry { character: '7', representation: "--..." },
    Entry { character: '8', representation: "---.." },
    Entry { character: '9', representation: "----." },
    Entry { character: '.', representation: ".-.-.-" },
    Entry { character: ',', representation: "--..--" },
    Entry { character: '?', representation: "..--.." },
    Entry { character: '\'', representation: ".----." },
    Entry { character: '!', representation: "-.-.--" },
    Entry { character: '/', representation: "-..-." },
    Entry { character: '(', representation: "-.--." },
    Entry { character: ')', representation: "-.--.-" },
    Entry { character: '&', representation: ".-..." },
    Entry { character: ':', representation: "---..." },
    Entry { character: ';', representation: "-.-.-." },
    Entry { character: '=', representation: "-...-" },
    Entry { character: '+', representation: ".-.-." },
    Entry { character: '-', representation: "-....-" },
    Entry { character: '_', representation: "..--.-" },
    Entry { character: '"', representation: ".-..-." },
    Entry { character: '$', representation: "...-..-" },
    Entry { character: '@', representation: ".--.-." },
    // ISO-Latin accented letters
    Entry { character: 'Ä', representation: ".-.-" },
    Entry { character: 'Á', representation: ".--.-" },
    Entry { character: 'É', representation: "..-.." },
    Entry { character: 'Ñ', representation: "--.--" },
    Entry { character: 'Ö', representation: "---." },
    Entry { character: 'Ü', representation: "..--" },
];

// Procedural signals reuse the dot/dash codes of existing punctuation (AR
// and `+` both key as ".-.-.", BT and `=` both key as "-...-"), so they are
// deliberately kept out of `ENTRIES`: registering them there would give two
// characters the same representation and break the character<->
// representation round-trip. `<`/`>`/`~` exist only as printable stand-ins
// in this procedural table, looked up by `procedural_expansion`.
const PROCEDURALS: &[Procedural] = &[
    Procedural { character: '<', expansion: "VA", usually_expanded: true },
    Procedural { character: '>', expansion: "AR", usually_expanded: true },
    Procedural { character: '~', expansion: "BT", usually_expanded: false },
];

/// Sentinel-bit hash of a dot/dash representation. Returns 0 for invalid
/// representations (too long, or containing anything but `.`/`-`).
pub fn hash_representation(representation: &str) -> u16 {
    if representation.is_empty() || representation.len() > 7 {
        return 0;
    }
    let mut hash: u16 = 1;
    for c in representation.chars() {
        hash <<= 1;
        match c {
            '-' => hash |= 1,
            '.' => {}
            _ => return 0,
        }
    }
    hash
}

struct Tables {
    /// Forward: uppercase character → representation.
    forward: std::collections::HashMap<char, &'static str>,
    /// Reverse: hash → character, indexed directly (hash fits in 0..=255).
    reverse_by_hash: Vec<Option<char>>,
    /// Fallback linear scan, kept in sync with `forward`, used when the
    /// direct hash table doesn't cover a representation.
    reverse_linear: Vec<(&'static str, char)>,
    proceduralals: std::collections::HashMap<char, Procedural>,
}

fn build_tables() -> Tables {
    let mut forward = std::collections::HashMap::new();
    let mut reverse_by_hash = vec![None; 256];
    let mut reverse_linear = Vec::new();
    for e in ENTRIES {
        forward.insert(e.character, e.representation);
        let h = hash_representation(e.representation) as usize;
        if h != 0 && h < reverse_by_hash.len() {
            reverse_by_hash[h] = Some(e.character);
        }
        reverse_linear.push((e.representation, e.character));
    }
    let mut proceduralals = std::collections::HashMap::new();
    for p in PROCEDURALS {
        proceduralals.insert(p.character, *p);
    }
    Tables { forward, reverse_by_hash, reverse_linear, proceduralals }
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(build_tables)
}

/// Looks up a character's dot/dash representation. Lower-to-upper coercion
/// applied.
pub fn character_to_representation(c: char) -> Option<&'static str> {
    tables().forward.get(&c.to_ascii_uppercase()).copied()
}

/// Reverse lookup from a dot/dash representation to its character. `Ok(None)`
/// means the representation is well-formed but matches no table entry;
/// `Err(BadArgument)` means `representation` contains something other than
/// `.`/`-` (or is empty/too long) and so could never match anything.
pub fn representation_to_character(representation: &str) -> Result<Option<char>> {
    let hash = hash_representation(representation) as usize;
    if hash == 0 {
        return Err(CwError::BadArgument {
            field: "representation",
            value: representation.to_string(),
        });
    }
    if let Some(Some(c)) = tables().reverse_by_hash.get(hash) {
        return Ok(Some(*c));
    }
    Ok(tables()
        .reverse_linear
        .iter()
        .find(|(rep, _)| *rep == representation)
        .map(|(_, c)| *c))
}

/// Procedural-signal lookup: expansion text plus "usually expanded" hint.
pub fn procedural_expansion(c: char) -> Option<(&'static str, bool)> {
    tables()
        .proceduralals
        .get(&c.to_ascii_uppercase())
        .map(|p| (p.expansion, p.usually_expanded))
}

/// All characters known to the table.
pub fn known_characters() -> impl Iterator<Item = char> {
    ENTRIES.iter().map(|e| e.character)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_every_character() {
        for c in known_characters() {
            let rep = character_to_representation(c).expect("table-listed char must encode");
            let back = representation_to_character(rep)
                .unwrap_or_else(|_| panic!("malformed representation {rep} ({c})"))
                .unwrap_or_else(|| panic!("no reverse for {rep} ({c})"));
            assert_eq!(back, c, "round-trip broke for {c:?} via {rep:?}");
        }
    }

    #[test]
    fn malformed_representation_is_bad_argument_not_none() {
        assert!(matches!(
            representation_to_character("abc"),
            Err(CwError::BadArgument { .. })
        ));
        assert!(matches!(representation_to_character(""), Err(CwError::BadArgument { .. })));
    }

    #[test]
    fn valid_but_unmatched_representation_is_ok_none() {
        // 6 dots is well-formed (length <= 7, only '.'/'-') but matches no
        // table entry.
        assert_eq!(representation_to_character("......").unwrap(), None);
    }

    #[test]
    fn hash_is_nonzero_and_injective_for_table_entries() {
        let mut seen = std::collections::HashSet::new();
        for e in ENTRIES {
            let h = hash_representation(e.representation);
            assert_ne!(h, 0, "{:?} hashed to 0", e.representation);
            assert!(seen.insert((h, e.representation)) || {
                // Same representation seen twice (shouldn't happen) is fine to
                // re-insert; a collision would be a different representation
                // mapping to the same hash, which is what we actually guard.
                ENTRIES.iter().filter(|o| hash_representation(o.representation) == h).count() == 1
            });
        }
        // Stronger injectivity check: group by hash, verify one rep per hash.
        let mut by_hash: std::collections::HashMap<u16, Vec<&str>> = std::collections::HashMap::new();
        for e in ENTRIES {
            by_hash.entry(hash_representation(e.representation)).or_default().push(e.representation);
        }
        for (h, reps) in by_hash {
            let unique: std::collections::HashSet<_> = reps.iter().collect();
            assert_eq!(unique.len(), reps.len(), "hash {h} collides: {reps:?}");
        }
    }

    #[test]
    fn hash_known_values() {
        assert_eq!(hash_representation(".-"), 0b101);
        assert_eq!(hash_representation(""), 0);
        assert_eq!(hash_representation(".........-"), 0); // too long
        assert_eq!(hash_representation(".x-"), 0); // invalid char
    }

    #[test]
    fn lowercase_coerces_to_upper() {
        assert_eq!(character_to_representation('a'), character_to_representation('A'));
    }

    #[test]
    fn procedural_lookup() {
        let (expansion, usually) = procedural_expansion('<').unwrap();
        assert_eq!(expansion, "VA");
        assert!(usually);
    }
}
