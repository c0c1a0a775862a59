//! Built-in label tables, indexed by class id.

pub const ALPHABET: [&str; 27] = [
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "Ñ", "O", "P", "Q", "R",
    "S", "T", "U", "V", "W", "X", "Y", "Z",
];

pub const WORDS_V2: [&str; 28] = [
    "sordo",
    "hola",
    "bien",
    "mal",
    "adios",
    "bienvenido",
    "gracias",
    "perdon",
    "permiso",
    "yo",
    "tu",
    "el",
    "ella",
    "nosotros",
    "usted",
    "ustedes",
    "que",
    "cuando",
    "donde",
    "como",
    "quien",
    "cuanto",
    "cual",
    "buenos dias",
    "buenas tardes",
    "buenas noches",
    "como estas",
    "por favor",
];

pub fn builtin(name: &str) -> Option<Vec<String>> {
    let table: &[&str] = match name {
        "alphabet" => &ALPHABET,
        "words_v2" => &WORDS_V2,
        _ => return None,
    };
    Some(table.iter().map(|label| label.to_string()).collect())
}
