//! 信息元素 TLV 链
//!
//! 元素格式 `[id u8][len u8][body len]`。声明长度越过缓冲末尾的元素视为链结束，不会被读出。

/// 单个元素
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ie<'a> {
    pub id: u8,
    pub body: &'a [u8],
}

/// TLV 链迭代器
#[derive(Debug, Clone)]
pub struct IeIter<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for IeIter<'a> {
    type Item = Ie<'a>;

    fn next(&mut self) -> Option<Ie<'a>> {
        if self.rest.len() < 2 {
            return None;
        }
        let id = self.rest[0];
        let len = self.rest[1] as usize;
        let Some(body) = self.rest.get(2..2 + len) else {
            self.rest = &[];
            return None;
        };
        self.rest = &self.rest[2 + len..];
        Some(Ie { id, body })
    }
}

pub fn ies(buf: &[u8]) -> IeIter<'_> {
    IeIter { rest: buf }
}

/// 查找第一个 `id` 元素，返回其 body
pub fn find_ie(buf: &[u8], id: u8) -> Option<&[u8]> {
    ies(buf).find(|ie| ie.id == id).map(|ie| ie.body)
}

/// 查找 OUI 与类型匹配的厂商元素（221），返回包含 OUI 与类型字节的完整 body
pub fn find_vendor_ie(buf: &[u8], oui: [u8; 3], oui_type: u8) -> Option<&[u8]> {
    ies(buf)
        .filter(|ie| ie.id == crate::WlanEid::VendorSpecific.as_u8())
        .map(|ie| ie.body)
        .find(|body| body.len() >= 4 && body[..3] == oui && body[3] == oui_type)
}
