pub trait MimeType {
    fn mime_type(&self) -> &'static str;
}

#[derive(Debug, PartialEq, Hash, Eq, Copy, Clone, Default)]
pub enum Extensions {
    #[default]
    Jpeg,
}

impl Extensions {
    pub fn name(&self) -> &'static str {
        match self {
            Extensions::Jpeg => "jpg",
        }
    }
}

impl MimeType for Extensions {
    fn mime_type(&self) -> &'static str {
        match &self {
            Extensions::Jpeg => "image/jpeg",
        }
    }
}
