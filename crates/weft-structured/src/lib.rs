//! Generic destructuring protocol shared by debug dumps and test assertions.
//!
//! A type describes itself to a [`Structurer`] as objects, arrays and scalar
//! values; the result is a `serde_json::Value` that can be compared or
//! pretty printed without knowing the concrete type.

use serde_json::{Map, Value as Json};

pub trait Structured {
    fn destructure(&self, s: &mut Structurer);
}

/// Receives exactly one value: a scalar, an object or an array.
#[derive(Default)]
pub struct Structurer {
    out: Option<Json>,
}

impl Structurer {
    pub fn value(&mut self, value: impl Into<Json>) {
        self.out = Some(value.into());
    }

    pub fn null(&mut self) {
        self.out = Some(Json::Null);
    }

    pub fn obj(&mut self, f: impl FnOnce(&mut ObjectStructurer)) {
        let mut object = ObjectStructurer { map: Map::new() };
        f(&mut object);
        self.out = Some(Json::Object(object.map));
    }

    pub fn arr(&mut self, f: impl FnOnce(&mut ArrayStructurer)) {
        let mut array = ArrayStructurer { items: Vec::new() };
        f(&mut array);
        self.out = Some(Json::Array(array.items));
    }

    pub fn structured(&mut self, value: &(impl Structured + ?Sized)) {
        value.destructure(self);
    }

    fn finish(self) -> Json {
        self.out.unwrap_or(Json::Null)
    }
}

pub struct ObjectStructurer {
    map: Map<String, Json>,
}

impl ObjectStructurer {
    pub fn key(&mut self, key: &str, f: impl FnOnce(&mut Structurer)) {
        let mut s = Structurer::default();
        f(&mut s);
        self.map.insert(key.to_owned(), s.finish());
    }

    pub fn field(&mut self, key: &str, value: &(impl Structured + ?Sized)) {
        self.key(key, |s| value.destructure(s));
    }
}

pub struct ArrayStructurer {
    items: Vec<Json>,
}

impl ArrayStructurer {
    pub fn item(&mut self, f: impl FnOnce(&mut Structurer)) {
        let mut s = Structurer::default();
        f(&mut s);
        self.items.push(s.finish());
    }

    pub fn element(&mut self, value: &(impl Structured + ?Sized)) {
        self.item(|s| value.destructure(s));
    }
}

pub fn to_json(value: &(impl Structured + ?Sized)) -> Json {
    let mut s = Structurer::default();
    value.destructure(&mut s);
    s.finish()
}

/// Pretty printed JSON, stable key order.
pub fn to_debug_string(value: &(impl Structured + ?Sized)) -> String {
    format!("{:#}", to_json(value))
}

impl Structured for str {
    fn destructure(&self, s: &mut Structurer) {
        s.value(self);
    }
}

impl Structured for String {
    fn destructure(&self, s: &mut Structurer) {
        s.value(self.as_str());
    }
}

impl Structured for bool {
    fn destructure(&self, s: &mut Structurer) {
        s.value(*self);
    }
}

macro_rules! structured_number {
    ($($ty:ty),*) => {$(
        impl Structured for $ty {
            fn destructure(&self, s: &mut Structurer) {
                s.value(*self);
            }
        }
    )*};
}

structured_number!(u32, u64, usize, i32, i64, f64);

impl<T: Structured> Structured for Option<T> {
    fn destructure(&self, s: &mut Structurer) {
        match self {
            Some(value) => value.destructure(s),
            None => s.null(),
        }
    }
}

impl<T: Structured> Structured for [T] {
    fn destructure(&self, s: &mut Structurer) {
        s.arr(|a| {
            for item in self {
                a.element(item);
            }
        });
    }
}

impl<T: Structured> Structured for Vec<T> {
    fn destructure(&self, s: &mut Structurer) {
        self.as_slice().destructure(s);
    }
}

impl<T: Structured + ?Sized> Structured for &T {
    fn destructure(&self, s: &mut Structurer) {
        (**self).destructure(s);
    }
}
