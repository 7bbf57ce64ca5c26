use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// État partagé muté sur place (ex: statut par host, une clé par writer)
pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Valeur publiée par échange de référence : les lecteurs récupèrent un `Arc`
/// vers une version complète, jamais une collection à moitié écrite.
#[derive(Debug)]
pub struct Published<T> {
    current: RwLock<Arc<T>>,
}

impl<T> Published<T> {
    pub fn new(value: T) -> Self {
        Self { current: RwLock::new(Arc::new(value)) }
    }

    /// Version courante (clone de l'Arc, le verrou n'est tenu que pour la copie)
    pub fn load(&self) -> Arc<T> {
        self.current.read().clone()
    }

    /// Remplace la version courante en bloc
    pub fn publish(&self, value: T) {
        *self.current.write() = Arc::new(value);
    }
}

impl<T: Default> Default for Published<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readers_keep_their_version_after_publish() {
        let cell = Published::new(vec![1, 2, 3]);
        let before = cell.load();

        cell.publish(vec![4]);

        assert_eq!(*before, vec![1, 2, 3]);
        assert_eq!(*cell.load(), vec![4]);
    }
}
