pub trait FileExtProvider {
    fn file_ext(&self) -> Option<&'static str>;
}

pub trait MediaTypeProvider {
    fn media_type(&self) -> &'static str;
}
