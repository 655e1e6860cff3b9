use std::collections::VecDeque;


/// Политика выбора свободного воркера.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Берётся воркер, освободившийся последним (стек).
    #[default]
    Lifo,
    /// Воркеры берутся по кругу (кольцо).
    Fifo,
}

impl Strategy {
    pub(crate) fn build(self, capacity: usize) -> Box<dyn Availability> {
        match self {
            Strategy::Lifo => Box::new(IdleStack::with_capacity(capacity)),
            Strategy::Fifo => Box::new(IdleRing::with_capacity(capacity)),
        }
    }
}

/// Множество индексов свободных воркеров.
///
/// Каждый индекс присутствует не более одного раза и всегда меньше текущего
/// числа воркеров. Реализации не синхронизированы, доступ только под локом пула.
pub trait Availability: Send {
    fn push(&mut self, index: usize);

    fn pop(&mut self) -> Option<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Удаляет все индексы `>= len`, чтобы оставшиеся воркеры были префиксом `[0, len)`.
    fn truncate(&mut self, len: usize);

    fn clear(&mut self);
}

#[derive(Debug, Default)]
pub struct IdleStack {
    indices: Vec<usize>,
}

impl IdleStack {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { indices: Vec::with_capacity(capacity) }
    }
}

impl Availability for IdleStack {
    #[inline]
    fn push(&mut self, index: usize) {
        self.indices.push(index);
    }

    #[inline]
    fn pop(&mut self) -> Option<usize> {
        self.indices.pop()
    }

    fn len(&self) -> usize {
        self.indices.len()
    }

    // [0,1,2,3,4] -> работа -> [0,1,2] -> рост -> [0,1,2,5,6] -> простой -> [0,1,2,5,6,3,4]
    // без сортировки обрезка хвоста выкинула бы 3 и 4 вместо 5 и 6
    fn truncate(&mut self, len: usize) {
        self.indices.sort_unstable();
        let keep = self.indices.partition_point(|&index| index < len);
        self.indices.truncate(keep);
    }

    fn clear(&mut self) {
        self.indices.clear();
    }
}

#[derive(Debug, Default)]
pub struct IdleRing {
    indices: VecDeque<usize>,
}

impl IdleRing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { indices: VecDeque::with_capacity(capacity) }
    }
}

impl Availability for IdleRing {
    #[inline]
    fn push(&mut self, index: usize) {
        self.indices.push_back(index);
    }

    #[inline]
    fn pop(&mut self) -> Option<usize> {
        self.indices.pop_front()
    }

    fn len(&self) -> usize {
        self.indices.len()
    }

    fn truncate(&mut self, len: usize) {
        self.indices.retain(|&index| index < len);
    }

    fn clear(&mut self) {
        self.indices.clear();
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn filled(strategy: Strategy, n: usize) -> Box<dyn Availability> {
        let mut idle = strategy.build(n);
        for index in 0..n {
            idle.push(index);
        }
        idle
    }

    #[test]
    fn stack_reuses_most_recently_idle() {
        let mut idle = filled(Strategy::Lifo, 3);
        assert_eq!(idle.pop(), Some(2));
        idle.push(2);
        assert_eq!(idle.pop(), Some(2));
        assert_eq!(idle.pop(), Some(1));
    }

    #[test]
    fn ring_rotates_through_workers() {
        let mut idle = filled(Strategy::Fifo, 3);
        let first = idle.pop().unwrap();
        idle.push(first);
        assert_eq!(idle.pop(), Some(1));
        assert_eq!(idle.pop(), Some(2));
        assert_eq!(idle.pop(), Some(0));
        assert!(idle.is_empty());
    }

    #[test]
    fn stack_truncate_drops_highest_indices() {
        let mut idle = IdleStack::default();
        for index in [0, 1, 2, 5, 6, 3, 4] {
            idle.push(index);
        }

        idle.truncate(4);

        assert_eq!(idle.len(), 4);
        let mut left = Vec::new();
        while let Some(index) = idle.pop() {
            left.push(index);
        }
        left.sort_unstable();
        assert_eq!(left, vec![0, 1, 2, 3]);
    }

    #[test]
    fn ring_truncate_keeps_order_of_prefix() {
        let mut idle = IdleRing::default();
        for index in [4, 0, 3, 1, 2] {
            idle.push(index);
        }

        idle.truncate(2);

        assert_eq!(idle.pop(), Some(0));
        assert_eq!(idle.pop(), Some(1));
        assert_eq!(idle.pop(), None);
    }
}
