use utf8_width::get_width;

/// Walks a string one character at a time, yielding each character as a `&str`.
pub trait StringUtil {
    fn strs(&self) -> Strs<'_>;
}

pub struct Strs<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Strs<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let &first = self.rest.as_bytes().first()?;
        // the cursor always sits on a char boundary, so `first` is a leading byte
        let width = get_width(first).max(1);
        let (head, tail) = self.rest.split_at(width);
        self.rest = tail;

        Some(head)
    }
}

impl StringUtil for str {
    fn strs(&self) -> Strs<'_> {
        Strs { rest: self }
    }
}
