use serde::{Deserialize, Deserializer, Serialize};

/// Position of a book in the catalog; also its row in the feature matrix.
pub type RowId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    #[serde(alias = "Book Name")]
    pub title: String,
    #[serde(alias = "Author")]
    pub author: String,
    #[serde(alias = "Rating")]
    pub rating: f64,
    #[serde(alias = "Number of Reviews", default)]
    pub reviews: u64,
    #[serde(alias = "Price", default)]
    pub price: f64,
    #[serde(alias = "Genres", default, deserialize_with = "genre_list")]
    pub genres: Vec<String>,
    #[serde(alias = "Listening Time Minutes", default)]
    pub listening_minutes: u32,
}

/// In text formats genres arrive either as an array or as one comma-separated
/// string. Binary artifacts always store a plain sequence.
fn genre_list<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }
    if !de.is_human_readable() {
        return Vec::<String>::deserialize(de);
    }
    let raw = Raw::deserialize(de)?;
    let items = match raw {
        Raw::List(v) => v,
        Raw::Joined(s) => s.split(',').map(|g| g.to_string()).collect(),
    };
    Ok(items
        .into_iter()
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .collect())
}

/// Ordered, read-only list of books with its derived title index.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    books: Vec<Book>,
    titles: Vec<String>,
}

impl Catalog {
    pub fn new(books: Vec<Book>) -> Self {
        let titles = books.iter().map(|b| b.title.clone()).collect();
        Self { books, titles }
    }

    pub fn len(&self) -> usize { self.books.len() }

    pub fn is_empty(&self) -> bool { self.books.is_empty() }

    pub fn get(&self, row: RowId) -> Option<&Book> { self.books.get(row as usize) }

    /// Titles in catalog order, used for fuzzy matching.
    pub fn titles(&self) -> &[String] { &self.titles }

    pub fn books(&self) -> &[Book] { &self.books }

    pub fn iter(&self) -> impl Iterator<Item = &Book> { self.books.iter() }

    /// First row whose title equals `title` exactly. Duplicate titles resolve
    /// to their earliest occurrence.
    pub fn first_row_of(&self, title: &str) -> Option<RowId> {
        self.titles.iter().position(|t| t == title).map(|i| i as RowId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dataset_column_names() {
        let raw = r#"{"Book Name":"Deep Work","Author":"Cal Newport","Rating":4.6,
            "Number of Reviews":1200,"Price":799.0,"Genres":"Self Help, Productivity",
            "Listening Time Minutes":460}"#;
        let book: Book = serde_json::from_str(raw).unwrap();
        assert_eq!(book.title, "Deep Work");
        assert_eq!(book.genres, vec!["Self Help", "Productivity"]);
        assert_eq!(book.listening_minutes, 460);
    }

    #[test]
    fn survives_bincode_round_trip() {
        let books = vec![
            Book {
                title: "Sapiens".into(), author: "Yuval Noah Harari".into(), rating: 4.5, reviews: 10,
                price: 600.0, genres: vec!["History".into(), "Science".into()], listening_minutes: 900,
            },
            Book {
                title: "Untagged".into(), author: "Nobody".into(), rating: 3.0, reviews: 0,
                price: 0.0, genres: vec![], listening_minutes: 0,
            },
        ];
        let bytes = bincode::serialize(&books).unwrap();
        let back: Vec<Book> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, books);
    }

    #[test]
    fn json_genres_accept_array_or_joined_string() {
        let listed: Book = serde_json::from_str(
            r#"{"title":"T","author":"A","rating":4.0,"genres":["Fiction"," Fantasy "]}"#,
        )
        .unwrap();
        assert_eq!(listed.genres, vec!["Fiction", "Fantasy"]);
        let missing: Book = serde_json::from_str(r#"{"title":"T","author":"A","rating":4.0}"#).unwrap();
        assert!(missing.genres.is_empty());
    }

    #[test]
    fn duplicate_titles_resolve_to_first_row() {
        let mk = |t: &str, a: &str| Book {
            title: t.into(), author: a.into(), rating: 4.0, reviews: 0, price: 0.0,
            genres: vec![], listening_minutes: 0,
        };
        let catalog = Catalog::new(vec![mk("A", "x"), mk("B", "y"), mk("B", "z")]);
        assert_eq!(catalog.first_row_of("B"), Some(1));
        assert_eq!(catalog.first_row_of("C"), None);
        assert_eq!(catalog.titles(), &["A".to_string(), "B".into(), "B".into()]);
    }
}
